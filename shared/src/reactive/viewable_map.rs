use std::{collections::HashMap, hash::Hash, sync::Arc};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::lifetime::{Lifetime, LifetimeDefinition};

use super::signal::{AdvisePriority, Handler, Signal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEvent<K, V> {
    Add { key: K, value: V },
    Update { key: K, old: V, new: V },
    Remove { key: K, value: V },
}

impl<K, V> MapEvent<K, V> {
    pub fn key(&self) -> &K {
        match self {
            MapEvent::Add { key, .. } | MapEvent::Update { key, .. } | MapEvent::Remove { key, .. } => key,
        }
    }

    pub fn new_value(&self) -> Option<&V> {
        match self {
            MapEvent::Add { value, .. } => Some(value),
            MapEvent::Update { new, .. } => Some(new),
            MapEvent::Remove { .. } => None,
        }
    }
}

struct MapInner<K, V> {
    entries: Mutex<IndexMap<K, V>>,
    change: Signal<MapEvent<K, V>>,
}

/// An observable key-unique mapping that remembers insertion order.
pub struct ViewableMap<K, V> {
    inner: Arc<MapInner<K, V>>,
}

impl<K, V> Clone for ViewableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> ViewableMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::named("<map>")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MapInner {
                entries: Mutex::new(IndexMap::new()),
                change: Signal::named(name),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.entries.lock().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.entries.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.entries.lock().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner
            .entries
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn change(&self) -> &Signal<MapEvent<K, V>> {
        &self.inner.change
    }

    /// Inserts or replaces `key`. Setting an equal value is a no-op and fires nothing.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        let event = {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(&key) {
                Some(existing) if *existing == value => return Some(value),
                Some(existing) => {
                    let old = std::mem::replace(existing, value.clone());
                    MapEvent::Update {
                        key,
                        old,
                        new: value,
                    }
                }
                None => {
                    entries.insert(key.clone(), value.clone());
                    MapEvent::Add { key, value }
                }
            }
        };
        let old = match &event {
            MapEvent::Update { old, .. } => Some(old.clone()),
            _ => None,
        };
        self.inner.change.fire(&event);
        old
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let value = self.inner.entries.lock().shift_remove(key)?;
        self.inner.change.fire(&MapEvent::Remove {
            key: key.clone(),
            value: value.clone(),
        });
        Some(value)
    }

    /// Removes every entry, one `Remove` event each, in insertion order.
    pub fn clear(&self) {
        for key in self.keys() {
            self.remove(&key);
        }
    }

    /// Subscribes `handler`, first replaying the current entries as `Add` events.
    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&MapEvent<K, V>) + Send + Sync + 'static) {
        self.advise_with(lifetime, AdvisePriority::Normal, handler);
    }

    pub fn advise_with(
        &self,
        lifetime: &Lifetime,
        priority: AdvisePriority,
        handler: impl Fn(&MapEvent<K, V>) + Send + Sync + 'static,
    ) {
        if !lifetime.is_alive() {
            return;
        }
        let handler: Handler<MapEvent<K, V>> = Arc::new(handler);
        if let Err(error) = self
            .inner
            .change
            .try_advise_handler(lifetime, priority, handler.clone())
        {
            panic!("{}", error);
        }
        for (key, value) in self.entries() {
            handler(&MapEvent::Add { key, value });
        }
    }

    /// Gives every entry a lifetime that ends when the key is removed or its value replaced.
    pub fn view(
        &self,
        lifetime: &Lifetime,
        handler: impl Fn(&Lifetime, &K, &V) + Send + Sync + 'static,
    ) {
        let parent = lifetime.clone();
        let entry_lifetimes: Arc<Mutex<HashMap<K, LifetimeDefinition>>> =
            Arc::new(Mutex::new(HashMap::new()));
        self.advise(lifetime, move |event| {
            let previous = entry_lifetimes.lock().remove(event.key());
            if let Some(previous) = previous {
                previous.terminate();
            }
            if let Some(value) = event.new_value() {
                let entry = parent.create_nested();
                entry_lifetimes
                    .lock()
                    .insert(event.key().clone(), entry.clone());
                handler(entry.lifetime(), event.key(), value);
            }
        });
    }
}

impl<K, V> Default for ViewableMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
