use std::sync::Arc;

use parking_lot::Mutex;

use crate::lifetime::{Lifetime, LifetimeDefinition};

use super::{
    error::ReactiveError,
    signal::{AdvisePriority, Handler, Signal},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent<T> {
    Add { index: usize, value: T },
    Update { index: usize, old: T, new: T },
    Remove { index: usize, value: T },
}

impl<T> ListEvent<T> {
    pub fn index(&self) -> usize {
        match self {
            ListEvent::Add { index, .. }
            | ListEvent::Update { index, .. }
            | ListEvent::Remove { index, .. } => *index,
        }
    }

    /// The value present after the event, if any.
    pub fn new_value(&self) -> Option<&T> {
        match self {
            ListEvent::Add { value, .. } => Some(value),
            ListEvent::Update { new, .. } => Some(new),
            ListEvent::Remove { .. } => None,
        }
    }
}

struct ListInner<T> {
    items: Mutex<Vec<T>>,
    change: Signal<ListEvent<T>>,
}

/// An observable ordered sequence. Each mutation fires exactly one event before returning.
pub struct ViewableList<T> {
    inner: Arc<ListInner<T>>,
}

impl<T> Clone for ViewableList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ViewableList<T> {
    pub fn new() -> Self {
        Self::named("<list>")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ListInner {
                items: Mutex::new(Vec::new()),
                change: Signal::named(name),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.lock().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.lock().clone()
    }

    pub fn change(&self) -> &Signal<ListEvent<T>> {
        &self.inner.change
    }

    pub fn add(&self, value: T) {
        let index = {
            let mut items = self.inner.items.lock();
            items.push(value.clone());
            items.len() - 1
        };
        self.inner.change.fire(&ListEvent::Add { index, value });
    }

    pub fn try_insert(&self, index: usize, value: T) -> Result<(), ReactiveError> {
        {
            let mut items = self.inner.items.lock();
            if index > items.len() {
                return Err(ReactiveError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value.clone());
        }
        self.inner.change.fire(&ListEvent::Add { index, value });
        Ok(())
    }

    pub fn insert(&self, index: usize, value: T) {
        if let Err(error) = self.try_insert(index, value) {
            panic!("{}", error);
        }
    }

    /// Replaces the element at `index`, returning the previous one.
    pub fn try_set(&self, index: usize, value: T) -> Result<T, ReactiveError> {
        let old = {
            let mut items = self.inner.items.lock();
            let len = items.len();
            let Some(slot) = items.get_mut(index) else {
                return Err(ReactiveError::IndexOutOfBounds { index, len });
            };
            std::mem::replace(slot, value.clone())
        };
        self.inner.change.fire(&ListEvent::Update {
            index,
            old: old.clone(),
            new: value,
        });
        Ok(old)
    }

    pub fn set(&self, index: usize, value: T) -> T {
        match self.try_set(index, value) {
            Ok(old) => old,
            Err(error) => panic!("{}", error),
        }
    }

    pub fn try_remove_at(&self, index: usize) -> Result<T, ReactiveError> {
        let value = {
            let mut items = self.inner.items.lock();
            if index >= items.len() {
                return Err(ReactiveError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            items.remove(index)
        };
        self.inner.change.fire(&ListEvent::Remove {
            index,
            value: value.clone(),
        });
        Ok(value)
    }

    pub fn remove_at(&self, index: usize) -> T {
        match self.try_remove_at(index) {
            Ok(value) => value,
            Err(error) => panic!("{}", error),
        }
    }

    /// Removes every element from the back, one `Remove` event each.
    pub fn clear(&self) {
        loop {
            let removed = {
                let mut items = self.inner.items.lock();
                items.pop().map(|value| (items.len(), value))
            };
            let Some((index, value)) = removed else {
                return;
            };
            self.inner.change.fire(&ListEvent::Remove { index, value });
        }
    }

    /// Subscribes `handler`, first replaying the current contents as `Add` events.
    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&ListEvent<T>) + Send + Sync + 'static) {
        self.advise_with(lifetime, AdvisePriority::Normal, handler);
    }

    pub fn advise_with(
        &self,
        lifetime: &Lifetime,
        priority: AdvisePriority,
        handler: impl Fn(&ListEvent<T>) + Send + Sync + 'static,
    ) {
        if !lifetime.is_alive() {
            return;
        }
        let handler: Handler<ListEvent<T>> = Arc::new(handler);
        if let Err(error) = self
            .inner
            .change
            .try_advise_handler(lifetime, priority, handler.clone())
        {
            panic!("{}", error);
        }
        for (index, value) in self.to_vec().into_iter().enumerate() {
            handler(&ListEvent::Add { index, value });
        }
    }

    /// Gives every element its own lifetime, terminated when the element is removed
    /// or replaced.
    pub fn view(
        &self,
        lifetime: &Lifetime,
        handler: impl Fn(&Lifetime, usize, &T) + Send + Sync + 'static,
    ) {
        let parent = lifetime.clone();
        let element_lifetimes: Arc<Mutex<Vec<LifetimeDefinition>>> = Arc::new(Mutex::new(Vec::new()));
        self.advise(lifetime, move |event| {
            let created = match event {
                ListEvent::Add { index, value } => {
                    let element = parent.create_nested();
                    element_lifetimes.lock().insert(*index, element.clone());
                    Some((element, *index, value))
                }
                ListEvent::Update { index, new, .. } => {
                    let element = parent.create_nested();
                    let previous = std::mem::replace(
                        &mut element_lifetimes.lock()[*index],
                        element.clone(),
                    );
                    previous.terminate();
                    Some((element, *index, new))
                }
                ListEvent::Remove { index, .. } => {
                    let previous = element_lifetimes.lock().remove(*index);
                    previous.terminate();
                    None
                }
            };
            if let Some((element, index, value)) = created {
                handler(element.lifetime(), index, value);
            }
        });
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ViewableList<T> {
    /// Removes the first element equal to `value`.
    pub fn remove(&self, value: &T) -> bool {
        let position = self.inner.items.lock().iter().position(|item| item == value);
        match position {
            Some(index) => self.try_remove_at(index).is_ok(),
            None => false,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for ViewableList<T> {
    fn default() -> Self {
        Self::new()
    }
}
