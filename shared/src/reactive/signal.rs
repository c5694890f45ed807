use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use arc_swap::ArcSwap;

use crate::{lifetime::Lifetime, panic_guard::catch_logged};

use super::error::ReactiveError;

pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Where a handler sits in the delivery order of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvisePriority {
    #[default]
    Normal,
    /// Delivered ahead of every normal handler. Synchronized entities advise their own
    /// wire forwarding this way so remote sends precede local reactions.
    Priority,
}

struct Subscription<T> {
    key: u64,
    priority: AdvisePriority,
    lifetime: Lifetime,
    handler: Handler<T>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            priority: self.priority,
            lifetime: self.lifetime.clone(),
            handler: self.handler.clone(),
        }
    }
}

struct SignalInner<T> {
    name: String,
    // Immutable snapshots swapped on every advise and removal; firing never locks.
    subscriptions: ArcSwap<Vec<Subscription<T>>>,
    next_key: AtomicU64,
}

/// A multicast, fire-and-forget event source.
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Signal<T> {
    pub fn new() -> Self {
        Self::named("<signal>")
    }

    /// A signal whose name appears in handler failure logs.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                name: name.into(),
                subscriptions: ArcSwap::from_pointee(Vec::new()),
                next_key: AtomicU64::new(1),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn has_subscribers(&self) -> bool {
        !self.inner.subscriptions.load().is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.load().len()
    }

    /// Subscribes `handler` for as long as `lifetime` is alive.
    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&T) + Send + Sync + 'static) {
        self.advise_with(lifetime, AdvisePriority::Normal, handler);
    }

    pub fn advise_with(
        &self,
        lifetime: &Lifetime,
        priority: AdvisePriority,
        handler: impl Fn(&T) + Send + Sync + 'static,
    ) {
        if let Err(error) = self.try_advise_handler(lifetime, priority, Arc::new(handler)) {
            panic!("{}", error);
        }
    }

    /// Subscribes a shared handler. Advising the same `Arc` twice while the first
    /// subscription is live is an error.
    pub fn try_advise_handler(
        &self,
        lifetime: &Lifetime,
        priority: AdvisePriority,
        handler: Handler<T>,
    ) -> Result<(), ReactiveError> {
        if !lifetime.is_alive() {
            return Ok(());
        }

        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        let subscription = Subscription {
            key,
            priority,
            lifetime: lifetime.clone(),
            handler,
        };

        loop {
            let current = self.inner.subscriptions.load_full();
            if current
                .iter()
                .any(|existing| Arc::ptr_eq(&existing.handler, &subscription.handler))
            {
                return Err(ReactiveError::DuplicateHandler {
                    source_name: self.inner.name.clone(),
                });
            }

            let mut next = (*current).clone();
            let position = match priority {
                AdvisePriority::Priority => next
                    .iter()
                    .position(|existing| existing.priority == AdvisePriority::Normal)
                    .unwrap_or(next.len()),
                AdvisePriority::Normal => next.len(),
            };
            next.insert(position, subscription.clone());

            let previous = self
                .inner
                .subscriptions
                .compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&*previous, &current) {
                break;
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let remove = move || {
            if let Some(inner) = weak.upgrade() {
                Signal { inner }.remove(key);
            }
        };
        if lifetime.try_on_termination(remove).is_err() {
            self.remove(key);
        }
        Ok(())
    }

    fn remove(&self, key: u64) {
        loop {
            let current = self.inner.subscriptions.load_full();
            if !current.iter().any(|subscription| subscription.key == key) {
                return;
            }
            let next: Vec<Subscription<T>> = current
                .iter()
                .filter(|subscription| subscription.key != key)
                .cloned()
                .collect();
            let previous = self
                .inner
                .subscriptions
                .compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&*previous, &current) {
                return;
            }
        }
    }

    /// Delivers `value` to every live subscriber, priority handlers first. A handler
    /// that panics is logged and skipped.
    pub fn fire(&self, value: &T) {
        let snapshot = self.inner.subscriptions.load_full();
        for subscription in snapshot.iter() {
            if !subscription.lifetime.is_alive() {
                continue;
            }
            let handler = &subscription.handler;
            catch_logged(
                format_args!("handler of `{}` panicked", self.inner.name),
                || handler(value),
            );
        }
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}
