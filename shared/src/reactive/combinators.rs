use std::sync::Arc;

use crate::lifetime::Lifetime;

use super::{property::Property, signal::Signal};

impl<T: Clone + PartialEq + Send + Sync + 'static> Property<T> {
    /// A property that follows `f(self)` for as long as `lifetime` is alive.
    pub fn map<R, F>(&self, lifetime: &Lifetime, f: F) -> Property<R>
    where
        R: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let target = Property::empty();
        let target_clone = target.clone();
        self.advise(lifetime, move |value| target_clone.set(f(value)));
        target
    }

    /// Keeps `self` and `other` equal in both directions. `self` wins the initial sync.
    pub fn bind_to(&self, lifetime: &Lifetime, other: &Property<T>) {
        let forward = other.clone();
        self.advise(lifetime, move |value| forward.set(value.clone()));
        let backward = self.clone();
        other.advise(lifetime, move |value| backward.set(value.clone()));
    }

    /// Delivers the current or next value once, then unsubscribes.
    pub fn advise_once(&self, lifetime: &Lifetime, handler: impl Fn(&T) + Send + Sync + 'static) {
        let once = lifetime.create_nested();
        let once_clone = once.clone();
        self.advise(&once, move |value| {
            if once_clone.terminate() {
                handler(value);
            }
        });
    }
}

impl Property<bool> {
    /// `true` while both inputs are `true`.
    pub fn and(&self, lifetime: &Lifetime, other: &Property<bool>) -> Property<bool> {
        combine(lifetime, self, other, |a, b| a && b)
    }

    /// `true` while either input is `true`.
    pub fn or(&self, lifetime: &Lifetime, other: &Property<bool>) -> Property<bool> {
        combine(lifetime, self, other, |a, b| a || b)
    }

    pub fn not(&self, lifetime: &Lifetime) -> Property<bool> {
        self.map(lifetime, |value| !value)
    }

    /// Runs `handler` with a lifetime that lasts while the property stays `true`.
    pub fn when_true(&self, lifetime: &Lifetime, handler: impl Fn(&Lifetime) + Send + Sync + 'static) {
        self.view(lifetime, move |value_lifetime, value| {
            if *value {
                handler(value_lifetime);
            }
        });
    }
}

fn combine(
    lifetime: &Lifetime,
    left: &Property<bool>,
    right: &Property<bool>,
    op: fn(bool, bool) -> bool,
) -> Property<bool> {
    let target = Property::new(op(
        left.value().unwrap_or(false),
        right.value().unwrap_or(false),
    ));

    let recompute = {
        let left = left.clone();
        let right = right.clone();
        let target = target.clone();
        Arc::new(move || {
            target.set(op(
                left.value().unwrap_or(false),
                right.value().unwrap_or(false),
            ))
        })
    };

    let on_left = recompute.clone();
    left.change().advise(lifetime, move |_| on_left());
    right.change().advise(lifetime, move |_| recompute());
    target
}

impl<T: 'static> Signal<T> {
    /// Delivers the next event once, then unsubscribes.
    pub fn advise_once(&self, lifetime: &Lifetime, handler: impl Fn(&T) + Send + Sync + 'static) {
        let once = lifetime.create_nested();
        let once_clone = once.clone();
        self.advise(&once, move |value| {
            if once_clone.terminate() {
                handler(value);
            }
        });
    }
}
