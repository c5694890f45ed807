use super::{Action, Scheduler};

/// Runs every action immediately on the calling thread. Always active.
#[derive(Default)]
pub struct SynchronousScheduler;

impl SynchronousScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for SynchronousScheduler {
    fn name(&self) -> &str {
        "synchronous"
    }

    fn queue(&self, action: Action) {
        action();
    }

    fn is_active(&self) -> bool {
        true
    }
}
