use std::{collections::HashMap, hash::Hash, sync::Arc};

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::lifetime::{Lifetime, LifetimeDefinition};

use super::signal::{AdvisePriority, Handler, Signal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetEvent<T> {
    Add(T),
    Remove(T),
}

impl<T> SetEvent<T> {
    pub fn value(&self) -> &T {
        match self {
            SetEvent::Add(value) | SetEvent::Remove(value) => value,
        }
    }
}

struct SetInner<T> {
    items: Mutex<IndexSet<T>>,
    change: Signal<SetEvent<T>>,
}

/// An observable set. Adding a present value or removing an absent one fires nothing.
pub struct ViewableSet<T> {
    inner: Arc<SetInner<T>>,
}

impl<T> Clone for ViewableSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Eq + Hash + Send + Sync + 'static> ViewableSet<T> {
    pub fn new() -> Self {
        Self::named("<set>")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SetInner {
                items: Mutex::new(IndexSet::new()),
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

    pub fn contains(&self, value: &T) -> bool {
        self.inner.items.lock().contains(value)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.lock().iter().cloned().collect()
    }

    pub fn change(&self) -> &Signal<SetEvent<T>> {
        &self.inner.change
    }

    pub fn add(&self, value: T) -> bool {
        if !self.inner.items.lock().insert(value.clone()) {
            return false;
        }
        self.inner.change.fire(&SetEvent::Add(value));
        true
    }

    pub fn remove(&self, value: &T) -> bool {
        if !self.inner.items.lock().shift_remove(value) {
            return false;
        }
        self.inner.change.fire(&SetEvent::Remove(value.clone()));
        true
    }

    pub fn clear(&self) {
        for value in self.to_vec() {
            self.remove(&value);
        }
    }

    /// Subscribes `handler`, first replaying the current members as `Add` events.
    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&SetEvent<T>) + Send + Sync + 'static) {
        self.advise_with(lifetime, AdvisePriority::Normal, handler);
    }

    pub fn advise_with(
        &self,
        lifetime: &Lifetime,
        priority: AdvisePriority,
        handler: impl Fn(&SetEvent<T>) + Send + Sync + 'static,
    ) {
        if !lifetime.is_alive() {
            return;
        }
        let handler: Handler<SetEvent<T>> = Arc::new(handler);
        if let Err(error) = self
            .inner
            .change
            .try_advise_handler(lifetime, priority, handler.clone())
        {
            panic!("{}", error);
        }
        for value in self.to_vec() {
            handler(&SetEvent::Add(value));
        }
    }

    /// Gives every member a lifetime that ends when it leaves the set.
    pub fn view(&self, lifetime: &Lifetime, handler: impl Fn(&Lifetime, &T) + Send + Sync + 'static) {
        let parent = lifetime.clone();
        let member_lifetimes: Arc<Mutex<HashMap<T, LifetimeDefinition>>> =
            Arc::new(Mutex::new(HashMap::new()));
        self.advise(lifetime, move |event| match event {
            SetEvent::Add(value) => {
                let member = parent.create_nested();
                member_lifetimes.lock().insert(value.clone(), member.clone());
                handler(member.lifetime(), value);
            }
            SetEvent::Remove(value) => {
                let previous = member_lifetimes.lock().remove(value);
                if let Some(previous) = previous {
                    previous.terminate();
                }
            }
        });
    }
}

impl<T: Clone + Eq + Hash + Send + Sync + 'static> Default for ViewableSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
