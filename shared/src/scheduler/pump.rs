use std::{
    collections::VecDeque,
    thread::{self, ThreadId},
};

use log::trace;
use parking_lot::Mutex;

use crate::panic_guard::catch_logged;

use super::{Action, Scheduler};

struct PumpState {
    queue: VecDeque<Action>,
    active_thread: Option<ThreadId>,
    depth: usize,
}

/// A FIFO queue drained explicitly by [`PumpScheduler::pump`]. The scheduler counts as
/// active only on the thread currently pumping or inside [`PumpScheduler::run_active`].
pub struct PumpScheduler {
    name: String,
    state: Mutex<PumpState>,
}

impl PumpScheduler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(PumpState {
                queue: VecDeque::new(),
                active_thread: None,
                depth: 0,
            }),
        }
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Runs `f` as if inside the scheduler.
    pub fn run_active<T>(&self, f: impl FnOnce() -> T) -> T {
        self.enter();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
        self.exit();
        match result {
            Ok(value) => value,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// Runs queued actions, including ones queued meanwhile, until the queue is empty.
    /// Returns how many actions ran.
    pub fn pump(&self) -> usize {
        self.enter();
        let mut count = 0;
        loop {
            let next = self.state.lock().queue.pop_front();
            let Some(action) = next else {
                break;
            };
            catch_logged(format_args!("action on `{}` panicked", self.name), action);
            count += 1;
        }
        self.exit();
        if count > 0 {
            trace!("scheduler `{}` pumped {} actions", self.name, count);
        }
        count
    }

    fn enter(&self) {
        let mut state = self.state.lock();
        let current = thread::current().id();
        if let Some(active) = state.active_thread {
            if active != current {
                panic!("scheduler `{}` is already active on another thread", self.name);
            }
        }
        state.active_thread = Some(current);
        state.depth += 1;
    }

    fn exit(&self) {
        let mut state = self.state.lock();
        state.depth -= 1;
        if state.depth == 0 {
            state.active_thread = None;
        }
    }
}

impl Scheduler for PumpScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn queue(&self, action: Action) {
        self.state.lock().queue.push_back(action);
    }

    fn is_active(&self) -> bool {
        self.state.lock().active_thread == Some(thread::current().id())
    }
}
