use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{bounded, unbounded, Sender};
use log::{debug, warn};
use parking_lot::Mutex;

use crate::panic_guard::catch_logged;

use super::{Action, Scheduler, SchedulerError};

/// Executes queued actions in order on one dedicated thread.
pub struct ThreadScheduler {
    name: String,
    sender: Mutex<Option<Sender<Action>>>,
    worker: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadScheduler {
    pub fn new(name: impl Into<String>) -> Result<Self, SchedulerError> {
        let name = name.into();
        let (sender, receiver) = unbounded::<Action>();
        let worker_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for action in receiver {
                    catch_logged(format_args!("action on `{}` panicked", worker_name), action);
                }
                debug!("scheduler thread `{}` stopped", worker_name);
            })
            .map_err(|error| SchedulerError::Spawn {
                name: name.clone(),
                reason: error.to_string(),
            })?;

        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Runs `f` on the worker and waits for its result. Runs inline when already there.
    pub fn run_sync<T: Send + 'static>(&self, f: impl FnOnce() -> T + Send + 'static) -> Option<T> {
        if self.is_active() {
            return Some(f());
        }
        let (done_sender, done_receiver) = bounded(1);
        self.queue(Box::new(move || {
            let _ = done_sender.send(f());
        }));
        done_receiver.recv().ok()
    }

    /// Stops accepting work, lets queued actions finish, and joins the worker.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        if self.is_active() {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!("scheduler thread `{}` panicked", self.name);
            }
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn queue(&self, action: Action) {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => {
                if sender.send(action).is_err() {
                    warn!("scheduler `{}` worker is gone, dropping action", self.name);
                }
            }
            None => warn!("scheduler `{}` is shut down, dropping action", self.name),
        }
    }

    fn is_active(&self) -> bool {
        thread::current().id() == self.worker
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
