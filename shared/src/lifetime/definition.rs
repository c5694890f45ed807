use std::{
    fmt,
    ops::Deref,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock, Weak,
    },
    thread::{self, ThreadId},
};

use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::panic_guard::catch_logged;

use super::error::LifetimeError;

static NEXT_LIFETIME_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifetimeStatus {
    Alive,
    Terminating,
    Terminated,
}

type Action = Box<dyn FnOnce() + Send>;

enum Resource {
    Action(Action),
    Nested(Lifetime),
}

struct State {
    status: LifetimeStatus,
    // Actions and nested lifetimes in registration order. Terminated children vacate their slot.
    resources: Vec<Option<Resource>>,
    terminating_thread: Option<ThreadId>,
    // Slots this lifetime occupies in its parents. An intersection has two.
    parents: Vec<(Weak<LifetimeInner>, usize)>,
}

struct LifetimeInner {
    id: u64,
    eternal: bool,
    state: Mutex<State>,
    torn_down: Condvar,
}

/// A read-only handle onto a scope. Everything that registers work against a lifetime
/// is undone, in reverse registration order, when the lifetime terminates.
#[derive(Clone)]
pub struct Lifetime {
    inner: Arc<LifetimeInner>,
}

impl Lifetime {
    fn with_status(
        status: LifetimeStatus,
        eternal: bool,
        parent: Option<(Weak<LifetimeInner>, usize)>,
    ) -> Self {
        let id = if eternal {
            0
        } else {
            NEXT_LIFETIME_ID.fetch_add(1, Ordering::Relaxed)
        };
        Self {
            inner: Arc::new(LifetimeInner {
                id,
                eternal,
                state: Mutex::new(State {
                    status,
                    resources: Vec::new(),
                    terminating_thread: None,
                    parents: parent.into_iter().collect(),
                }),
                torn_down: Condvar::new(),
            }),
        }
    }

    /// The lifetime that never terminates. Actions registered on it are dropped unrun.
    pub fn eternal() -> Lifetime {
        static ETERNAL: OnceLock<Lifetime> = OnceLock::new();
        ETERNAL
            .get_or_init(|| Lifetime::with_status(LifetimeStatus::Alive, true, None))
            .clone()
    }

    /// A shared lifetime that is already terminated.
    pub fn terminated() -> Lifetime {
        static TERMINATED: OnceLock<Lifetime> = OnceLock::new();
        TERMINATED
            .get_or_init(|| Lifetime::with_status(LifetimeStatus::Terminated, false, None))
            .clone()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn status(&self) -> LifetimeStatus {
        self.inner.state.lock().status
    }

    pub fn is_alive(&self) -> bool {
        self.status() == LifetimeStatus::Alive
    }

    pub fn is_eternal(&self) -> bool {
        self.inner.eternal
    }

    pub fn ptr_eq(&self, other: &Lifetime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Creates a child scope. The child terminates no later than `self`; a child of a
    /// lifetime that is no longer alive starts out terminated.
    pub fn create_nested(&self) -> LifetimeDefinition {
        if self.inner.eternal {
            return LifetimeDefinition::new();
        }

        let mut state = self.inner.state.lock();
        if state.status != LifetimeStatus::Alive {
            return LifetimeDefinition {
                lifetime: Lifetime::with_status(LifetimeStatus::Terminated, false, None),
            };
        }

        let slot = state.resources.len();
        let child = Lifetime::with_status(
            LifetimeStatus::Alive,
            false,
            Some((Arc::downgrade(&self.inner), slot)),
        );
        state.resources.push(Some(Resource::Nested(child.clone())));
        LifetimeDefinition { lifetime: child }
    }

    /// A new definition that terminates as soon as either `self` or `other` does. It is
    /// nested in both, and leaves no entry behind in either once it terminates.
    pub fn intersect(&self, other: &Lifetime) -> LifetimeDefinition {
        let definition = self.create_nested();
        if !other.try_adopt(&definition.lifetime) {
            definition.terminate();
        }
        definition
    }

    /// Registers `child` as an additional nested lifetime of `self`.
    fn try_adopt(&self, child: &Lifetime) -> bool {
        if self.inner.eternal {
            return true;
        }
        let slot = {
            let mut state = self.inner.state.lock();
            if state.status != LifetimeStatus::Alive {
                return false;
            }
            let slot = state.resources.len();
            state.resources.push(Some(Resource::Nested(child.clone())));
            slot
        };

        let mut child_state = child.inner.state.lock();
        if child_state.status == LifetimeStatus::Alive {
            child_state.parents.push((Arc::downgrade(&self.inner), slot));
            return true;
        }
        drop(child_state);
        vacate_slot(&self.inner, slot);
        false
    }

    /// Number of actions and live nested lifetimes registered on this lifetime.
    pub fn resource_count(&self) -> usize {
        self.inner.state.lock().resources.iter().flatten().count()
    }

    fn try_add_action(&self, action: Action) -> Result<(), (Action, LifetimeStatus)> {
        if self.inner.eternal {
            return Ok(());
        }
        let mut state = self.inner.state.lock();
        if state.status != LifetimeStatus::Alive {
            return Err((action, state.status));
        }
        state.resources.push(Some(Resource::Action(action)));
        Ok(())
    }

    /// Registers `action` to run when this lifetime terminates.
    pub fn try_on_termination(
        &self,
        action: impl FnOnce() + Send + 'static,
    ) -> Result<(), LifetimeError> {
        self.try_add_action(Box::new(action))
            .map_err(|(_, status)| LifetimeError::NotAlive {
                id: self.inner.id,
                status,
            })
    }

    /// Panicking version of [`Lifetime::try_on_termination`].
    pub fn on_termination(&self, action: impl FnOnce() + Send + 'static) {
        if let Err(error) = self.try_on_termination(action) {
            panic!("{}", error);
        }
    }

    /// Runs `on_enter` now and schedules `on_exit` for termination. Returns `None`
    /// without running anything if the lifetime is not alive. If the lifetime
    /// terminates while `on_enter` runs, `on_exit` runs immediately.
    pub fn bracket<T>(
        &self,
        on_enter: impl FnOnce() -> T,
        on_exit: impl FnOnce() + Send + 'static,
    ) -> Option<T> {
        if !self.is_alive() {
            return None;
        }
        let value = on_enter();
        if let Err((on_exit, _)) = self.try_add_action(Box::new(on_exit)) {
            on_exit();
        }
        Some(value)
    }

    pub fn execute_if_alive<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        if self.is_alive() {
            Some(f())
        } else {
            None
        }
    }

    fn terminate(&self) -> bool {
        if self.inner.eternal {
            return false;
        }

        let current = thread::current().id();
        let resources = {
            let mut state = self.inner.state.lock();
            match state.status {
                LifetimeStatus::Alive => {}
                LifetimeStatus::Terminating => {
                    if state.terminating_thread != Some(current) {
                        while state.status != LifetimeStatus::Terminated {
                            self.inner.torn_down.wait(&mut state);
                        }
                    }
                    return false;
                }
                LifetimeStatus::Terminated => return false,
            }
            state.status = LifetimeStatus::Terminating;
            state.terminating_thread = Some(current);
            std::mem::take(&mut state.resources)
        };

        let id = self.inner.id;
        let count = resources.len();
        for resource in resources.into_iter().rev().flatten() {
            match resource {
                Resource::Action(action) => {
                    catch_logged(
                        format_args!("termination action of lifetime #{} panicked", id),
                        action,
                    );
                }
                Resource::Nested(child) => {
                    child.terminate();
                }
            }
        }

        let parents = {
            let mut state = self.inner.state.lock();
            state.status = LifetimeStatus::Terminated;
            state.terminating_thread = None;
            std::mem::take(&mut state.parents)
        };
        self.inner.torn_down.notify_all();
        trace!("lifetime #{} terminated ({} resources)", id, count);

        for (parent, slot) in parents {
            if let Some(parent) = parent.upgrade() {
                vacate_slot(&parent, slot);
            }
        }
        true
    }
}

/// Frees the slot a terminated child held in `parent`. A parent that is tearing down
/// already took its resources and is left alone.
fn vacate_slot(parent: &LifetimeInner, slot: usize) {
    let mut state = parent.state.lock();
    if state.status != LifetimeStatus::Alive {
        return;
    }
    if let Some(entry) = state.resources.get_mut(slot) {
        *entry = None;
    }
    while matches!(state.resources.last(), Some(None)) {
        state.resources.pop();
    }
}

impl PartialEq for Lifetime {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Lifetime {}

impl fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.eternal {
            write!(f, "Lifetime(Eternal)")
        } else {
            write!(f, "Lifetime(#{}, {:?})", self.inner.id, self.status())
        }
    }
}

/// The owning side of a [`Lifetime`]: the only handle that can terminate it.
#[derive(Clone, Debug)]
pub struct LifetimeDefinition {
    lifetime: Lifetime,
}

impl LifetimeDefinition {
    /// A new top-level lifetime.
    pub fn new() -> Self {
        Self {
            lifetime: Lifetime::with_status(LifetimeStatus::Alive, false, None),
        }
    }

    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    /// Runs every registered action and nested lifetime in reverse registration order.
    ///
    /// Returns `true` only for the call that performed the teardown. A concurrent call
    /// from another thread blocks until teardown completes and returns `false`; a
    /// re-entrant call from inside a termination action returns `false` immediately.
    pub fn terminate(&self) -> bool {
        self.lifetime.terminate()
    }
}

impl Default for LifetimeDefinition {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for LifetimeDefinition {
    type Target = Lifetime;

    fn deref(&self) -> &Lifetime {
        &self.lifetime
    }
}
