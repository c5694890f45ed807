use std::sync::Arc;

use parking_lot::Mutex;

use crate::lifetime::{Lifetime, SequentialLifetimes};

use super::{
    error::ReactiveError,
    signal::{AdvisePriority, Handler, Signal},
};

struct PropertyState<T> {
    value: Option<T>,
    firing: bool,
    pending: bool,
}

struct PropertyInner<T> {
    state: Mutex<PropertyState<T>>,
    change: Signal<T>,
}

/// A reactive cell. Setting a different value fires `change`; subscribers receive the
/// current value as soon as they advise.
pub struct Property<T> {
    inner: Arc<PropertyInner<T>>,
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Property<T> {
    pub fn new(value: T) -> Self {
        Self::with_state("<property>", Some(value))
    }

    /// A property that holds no value until the first `set`.
    pub fn empty() -> Self {
        Self::with_state("<property>", None)
    }

    pub fn named(name: impl Into<String>, value: Option<T>) -> Self {
        Self::with_state(name, value)
    }

    fn with_state(name: impl Into<String>, value: Option<T>) -> Self {
        Self {
            inner: Arc::new(PropertyInner {
                state: Mutex::new(PropertyState {
                    value,
                    firing: false,
                    pending: false,
                }),
                change: Signal::named(name),
            }),
        }
    }

    pub fn value(&self) -> Option<T> {
        self.inner.state.lock().value.clone()
    }

    pub fn has_value(&self) -> bool {
        self.inner.state.lock().value.is_some()
    }

    /// The stream of changes, without replay of the current value.
    pub fn change(&self) -> &Signal<T> {
        &self.inner.change
    }

    /// Stores `value` and notifies subscribers if it differs from the current one.
    ///
    /// A handler that sets the property again while being notified does not recurse:
    /// the newest value is delivered once the running notification finishes.
    pub fn set(&self, value: T) {
        {
            let mut state = self.inner.state.lock();
            if state.value.as_ref() == Some(&value) {
                return;
            }
            state.value = Some(value);
            if state.firing {
                state.pending = true;
                return;
            }
            state.firing = true;
        }
        self.drain_changes();
    }

    /// Sets the value only if the property is empty. Returns whether it was set.
    pub fn set_if_empty(&self, value: T) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.value.is_some() {
                return false;
            }
            state.value = Some(value);
            if state.firing {
                state.pending = true;
                return true;
            }
            state.firing = true;
        }
        self.drain_changes();
        true
    }

    fn drain_changes(&self) {
        loop {
            let current = {
                let mut state = self.inner.state.lock();
                state.pending = false;
                match state.value.clone() {
                    Some(value) => value,
                    None => {
                        state.firing = false;
                        return;
                    }
                }
            };

            self.inner.change.fire(&current);

            let mut state = self.inner.state.lock();
            if !state.pending {
                state.firing = false;
                return;
            }
        }
    }

    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&T) + Send + Sync + 'static) {
        self.advise_with(lifetime, AdvisePriority::Normal, handler);
    }

    /// Subscribes `handler` and immediately delivers the current value, if any.
    pub fn advise_with(
        &self,
        lifetime: &Lifetime,
        priority: AdvisePriority,
        handler: impl Fn(&T) + Send + Sync + 'static,
    ) {
        if !lifetime.is_alive() {
            return;
        }
        let handler: Handler<T> = Arc::new(handler);
        if let Err(error) = self
            .inner
            .change
            .try_advise_handler(lifetime, priority, handler.clone())
        {
            panic!("{}", error);
        }
        if let Some(value) = self.value() {
            handler(&value);
        }
    }

    /// Gives every value its own lifetime, terminated when the value changes or
    /// `lifetime` ends.
    pub fn view(&self, lifetime: &Lifetime, handler: impl Fn(&Lifetime, &T) + Send + Sync + 'static) {
        let sequence = Arc::new(SequentialLifetimes::new(lifetime));
        self.advise(lifetime, move |value| {
            let value_lifetime = sequence.next();
            handler(&value_lifetime, value);
        });
    }
}

/// A property that accepts exactly one value. Used for results that settle once.
pub struct WriteOnceProperty<T> {
    property: Property<T>,
}

impl<T> Clone for WriteOnceProperty<T> {
    fn clone(&self) -> Self {
        Self {
            property: self.property.clone(),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> WriteOnceProperty<T> {
    pub fn new() -> Self {
        Self {
            property: Property::empty(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            property: Property::named(name, None),
        }
    }

    pub fn value(&self) -> Option<T> {
        self.property.value()
    }

    pub fn has_value(&self) -> bool {
        self.property.has_value()
    }

    /// Returns whether this call was the one that set the value.
    pub fn set_if_empty(&self, value: T) -> bool {
        self.property.set_if_empty(value)
    }

    pub fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        if self.property.set_if_empty(value) {
            Ok(())
        } else {
            Err(ReactiveError::AlreadySet {
                name: self.property.change().name().to_string(),
            })
        }
    }

    /// Panicking version of [`WriteOnceProperty::try_set`].
    pub fn set(&self, value: T) {
        if let Err(error) = self.try_set(value) {
            panic!("{}", error);
        }
    }

    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&T) + Send + Sync + 'static) {
        self.property.advise(lifetime, handler);
    }

    pub fn as_property(&self) -> &Property<T> {
        &self.property
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Default for WriteOnceProperty<T> {
    fn default() -> Self {
        Self::new()
    }
}
