use parking_lot::Mutex;

use super::{Lifetime, LifetimeDefinition};

/// Hands out a chain of nested lifetimes where creating the next one terminates the previous.
pub struct SequentialLifetimes {
    parent: Lifetime,
    current: Mutex<LifetimeDefinition>,
}

impl SequentialLifetimes {
    pub fn new(parent: &Lifetime) -> Self {
        let current = Lifetime::terminated().create_nested();
        Self {
            parent: parent.clone(),
            current: Mutex::new(current),
        }
    }

    /// Terminates the current lifetime and returns a fresh one nested in the parent.
    pub fn next(&self) -> Lifetime {
        let next = self.parent.create_nested();
        let previous = std::mem::replace(&mut *self.current.lock(), next.clone());
        previous.terminate();
        next.lifetime().clone()
    }

    pub fn terminate_current(&self) {
        let current = self.current.lock().clone();
        current.terminate();
    }

    pub fn is_terminated(&self) -> bool {
        !self.current.lock().is_alive()
    }
}
