mod error;
mod pump;
mod synchronous;
mod thread;

use std::sync::Arc;

pub use error::SchedulerError;
pub use pump::PumpScheduler;
pub use synchronous::SynchronousScheduler;
pub use thread::ThreadScheduler;

pub type Action = Box<dyn FnOnce() + Send>;

/// A single-writer execution context. Every entity bound to a protocol is mutated only
/// while that protocol's scheduler is active.
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &str;

    /// Runs `action` later, in order, inside this scheduler.
    fn queue(&self, action: Action);

    /// Whether the calling code is running inside this scheduler.
    fn is_active(&self) -> bool;

    /// Whether this scheduler may run queued actions out of order. Such schedulers opt
    /// out of per-id ordering in the message broker.
    fn out_of_order_execution(&self) -> bool {
        false
    }

    fn try_assert_thread(&self) -> Result<(), SchedulerError> {
        if self.is_active() {
            return Ok(());
        }
        let current = std::thread::current();
        Err(SchedulerError::WrongThread {
            scheduler: self.name().to_string(),
            thread: current.name().unwrap_or("<unnamed>").to_string(),
        })
    }

    /// Panicking version of [`Scheduler::try_assert_thread`].
    fn assert_thread(&self) {
        if let Err(error) = self.try_assert_thread() {
            panic!("{}", error);
        }
    }

    /// Runs inline when already active, otherwise queues.
    fn invoke_or_queue(&self, action: Action) {
        if self.is_active() {
            action();
        } else {
            self.queue(action);
        }
    }
}

/// Identity comparison of two scheduler handles.
pub fn same_scheduler(a: &Arc<dyn Scheduler>, b: &Arc<dyn Scheduler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
