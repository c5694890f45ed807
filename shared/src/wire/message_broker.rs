use std::{
    collections::{HashMap, VecDeque},
    fmt::Write,
    sync::Arc,
};

use indexmap::IndexSet;
use log::{trace, warn};
use parking_lot::Mutex;

use crate::{
    identity::RdId,
    lifetime::Lifetime,
    panic_guard::catch_logged,
    scheduler::{same_scheduler, Scheduler},
};

use super::{error::WireError, RdWireable};

pub const DEFAULT_MAX_BUFFERED_PER_ID: usize = 4096;

// How many ended transient subscriptions are remembered so their stragglers get dropped.
const MAX_RETIRED_IDS: usize = 4096;

/// Messages held back for one id.
#[derive(Default)]
struct Mq {
    // Waiting for a subscriber, or for a drain on the default scheduler.
    default_scheduler_messages: VecDeque<Vec<u8>>,
    // Arrived for a custom-scheduler subscriber while older messages were still held above.
    custom_scheduler_messages: Vec<Vec<u8>>,
}

#[derive(Default)]
struct BrokerState {
    subscriptions: HashMap<RdId, Arc<dyn RdWireable>>,
    queues: HashMap<RdId, Mq>,
    // Ids of ended transient subscriptions, oldest first.
    retired: IndexSet<RdId>,
}

struct BrokerInner {
    default_scheduler: Arc<dyn Scheduler>,
    max_buffered_per_id: usize,
    state: Mutex<BrokerState>,
}

enum Route {
    Deliver(Arc<dyn RdWireable>, Vec<u8>),
    Drain,
    Held,
    Dropped,
}

/// Routes inbound `(id, payload)` pairs to the one subscriber bound to `id`.
///
/// Messages for an id nobody has bound yet are held in arrival order and delivered once
/// a subscriber appears. A subscriber on a custom scheduler receives newer messages only
/// after the held ones have been handed over, so per-id order survives the scheduler hop.
/// The lock is never held while a scheduler or handler runs.
#[derive(Clone)]
pub struct MessageBroker {
    inner: Arc<BrokerInner>,
}

impl MessageBroker {
    pub fn new(default_scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_capacity(default_scheduler, DEFAULT_MAX_BUFFERED_PER_ID)
    }

    /// A broker that holds at most `max_buffered_per_id` messages per unbound id,
    /// dropping the oldest beyond that.
    pub fn with_capacity(default_scheduler: Arc<dyn Scheduler>, max_buffered_per_id: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                default_scheduler,
                max_buffered_per_id: max_buffered_per_id.max(1),
                state: Mutex::new(BrokerState::default()),
            }),
        }
    }

    pub fn default_scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.inner.default_scheduler
    }

    fn is_default(&self, scheduler: &Arc<dyn Scheduler>) -> bool {
        same_scheduler(scheduler, &self.inner.default_scheduler)
    }

    /// Accepts one inbound message. Safe to call from any thread.
    pub fn dispatch(&self, id: RdId, payload: Vec<u8>) -> Result<(), WireError> {
        if id.is_null() {
            return Err(WireError::NullId);
        }

        let route = {
            let mut state = self.inner.state.lock();
            match state.subscriptions.get(&id).cloned() {
                None if state.retired.contains(&id) => Route::Dropped,
                None => {
                    self.hold(&mut state, id, payload);
                    Route::Drain
                }
                Some(subscriber) => {
                    let scheduler = subscriber.wire_scheduler();
                    if scheduler.out_of_order_execution() {
                        Route::Deliver(subscriber, payload)
                    } else {
                        match state.queues.get_mut(&id) {
                            None => Route::Deliver(subscriber, payload),
                            Some(mq) if self.is_default(&scheduler) => {
                                mq.default_scheduler_messages.push_back(payload);
                                Route::Drain
                            }
                            Some(mq) => {
                                mq.custom_scheduler_messages.push(payload);
                                Route::Held
                            }
                        }
                    }
                }
            }
        };

        match route {
            Route::Drain => self.queue_drain(id),
            Route::Deliver(subscriber, payload) => self.invoke(subscriber, payload, false),
            Route::Held => {}
            Route::Dropped => trace!("dropping message for retired id {}", id),
        }
        Ok(())
    }

    fn hold(&self, state: &mut BrokerState, id: RdId, payload: Vec<u8>) {
        let mq = state.queues.entry(id).or_default();
        if mq.default_scheduler_messages.len() >= self.inner.max_buffered_per_id {
            mq.default_scheduler_messages.pop_front();
            warn!(
                "too many messages held for unbound id {}, dropping the oldest",
                id
            );
        }
        mq.default_scheduler_messages.push_back(payload);
    }

    fn queue_drain(&self, id: RdId) {
        let broker = self.clone();
        self.inner
            .default_scheduler
            .queue(Box::new(move || broker.drain(id)));
    }

    // Runs on the default scheduler.
    fn drain(&self, id: RdId) {
        let (subscriber, held) = {
            let mut state = self.inner.state.lock();
            let Some(subscriber) = state.subscriptions.get(&id).cloned() else {
                if state.queues.contains_key(&id) {
                    trace!("no subscriber for id {} yet, keeping messages held", id);
                }
                return;
            };
            let held: Vec<Vec<u8>> = match state.queues.get_mut(&id) {
                Some(mq) => mq.default_scheduler_messages.drain(..).collect(),
                None => return,
            };
            (subscriber, held)
        };

        let sync = self.is_default(&subscriber.wire_scheduler());
        for payload in held {
            self.invoke(subscriber.clone(), payload, sync);
        }

        // Handlers may have caused more messages to be held; only release the custom
        // backlog once the default backlog is really empty.
        let custom = {
            let mut state = self.inner.state.lock();
            let empty = state
                .queues
                .get(&id)
                .map_or(false, |mq| mq.default_scheduler_messages.is_empty());
            if !empty {
                return;
            }
            state
                .queues
                .remove(&id)
                .map(|mq| mq.custom_scheduler_messages)
                .unwrap_or_default()
        };
        for payload in custom {
            self.invoke(subscriber.clone(), payload, false);
        }
    }

    fn invoke(&self, subscriber: Arc<dyn RdWireable>, payload: Vec<u8>, sync: bool) {
        if sync {
            catch_logged(
                format_args!("wire handler of `{}` panicked", subscriber.location()),
                || subscriber.on_wire_received(&payload),
            );
            return;
        }

        let broker = self.clone();
        let scheduler = subscriber.wire_scheduler();
        scheduler.queue(Box::new(move || {
            if !broker.is_subscribed(&subscriber) {
                trace!(
                    "subscriber `{}` ({}) disappeared, dropping message",
                    subscriber.location(),
                    subscriber.rd_id()
                );
                return;
            }
            catch_logged(
                format_args!("wire handler of `{}` panicked", subscriber.location()),
                || subscriber.on_wire_received(&payload),
            );
        }));
    }

    fn is_subscribed(&self, subscriber: &Arc<dyn RdWireable>) -> bool {
        let state = self.inner.state.lock();
        state
            .subscriptions
            .get(&subscriber.rd_id())
            .map_or(false, |current| std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(subscriber)))
    }

    /// Binds `entity` to its id for as long as `lifetime` is alive. Messages already held
    /// for the id are delivered in order.
    pub fn try_advise_on(&self, lifetime: &Lifetime, entity: Arc<dyn RdWireable>) -> Result<(), WireError> {
        self.subscribe(lifetime, entity, false)
    }

    /// Like [`MessageBroker::try_advise_on`], for an id that is never bound again. Once
    /// the subscription ends, messages still arriving for the id are dropped instead of
    /// held.
    pub fn try_advise_transient_on(
        &self,
        lifetime: &Lifetime,
        entity: Arc<dyn RdWireable>,
    ) -> Result<(), WireError> {
        self.subscribe(lifetime, entity, true)
    }

    fn subscribe(&self, lifetime: &Lifetime, entity: Arc<dyn RdWireable>, transient: bool) -> Result<(), WireError> {
        let id = entity.rd_id();
        if id.is_null() {
            return Err(WireError::NullId);
        }
        if !lifetime.is_alive() {
            return Ok(());
        }

        let has_held = {
            let mut state = self.inner.state.lock();
            if let Some(existing) = state.subscriptions.get(&id) {
                return Err(WireError::DuplicateSubscription {
                    id,
                    existing: existing.location(),
                });
            }
            state.subscriptions.insert(id, entity.clone());
            state.retired.shift_remove(&id);
            state.queues.contains_key(&id)
        };
        trace!("broker: `{}` ({}) subscribed", entity.location(), id);

        let broker = self.clone();
        let subscribed = entity.clone();
        let unsubscribe = move || broker.unsubscribe(id, &subscribed, transient);
        if let Err(error) = lifetime.try_on_termination(unsubscribe) {
            trace!("lifetime ended while subscribing `{}`: {}", entity.location(), error);
            self.unsubscribe(id, &entity, transient);
            return Ok(());
        }

        if has_held {
            if entity.wire_scheduler().out_of_order_execution() {
                self.drain(id);
            } else {
                self.queue_drain(id);
            }
        }
        Ok(())
    }

    /// Panicking version of [`MessageBroker::try_advise_on`].
    pub fn advise_on(&self, lifetime: &Lifetime, entity: Arc<dyn RdWireable>) {
        if let Err(error) = self.try_advise_on(lifetime, entity) {
            panic!("{}", error);
        }
    }

    fn unsubscribe(&self, id: RdId, entity: &Arc<dyn RdWireable>, transient: bool) {
        let mut state = self.inner.state.lock();
        let is_current = state
            .subscriptions
            .get(&id)
            .map_or(false, |current| std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(entity)));
        if !is_current {
            return;
        }
        state.subscriptions.remove(&id);
        if transient {
            if state.retired.len() >= MAX_RETIRED_IDS {
                state.retired.shift_remove_index(0);
            }
            state.retired.insert(id);
        }
        if let Some(mq) = state.queues.remove(&id) {
            trace!(
                "dropping {} held messages for unsubscribed id {}",
                mq.default_scheduler_messages.len() + mq.custom_scheduler_messages.len(),
                id
            );
        }
    }

    pub fn is_bound(&self, id: RdId) -> bool {
        self.inner.state.lock().subscriptions.contains_key(&id)
    }

    /// Whether messages for `id` are dropped because its transient subscription ended.
    pub fn is_retired(&self, id: RdId) -> bool {
        self.inner.state.lock().retired.contains(&id)
    }

    pub fn held_message_count(&self, id: RdId) -> usize {
        self.inner.state.lock().queues.get(&id).map_or(0, |mq| {
            mq.default_scheduler_messages.len() + mq.custom_scheduler_messages.len()
        })
    }

    /// A human readable listing of held messages and subscribers.
    pub fn dump(&self) -> String {
        let state = self.inner.state.lock();
        let mut output = String::new();
        let _ = writeln!(output, "MessageBroker dump");
        let _ = writeln!(output, "Held queues: {}", state.queues.len());
        for (id, mq) in &state.queues {
            let _ = write!(output, "  {:<20} -> {}", id.to_string(), mq.default_scheduler_messages.len());
            if !mq.custom_scheduler_messages.is_empty() {
                let _ = write!(output, " (+{} custom)", mq.custom_scheduler_messages.len());
            }
            let _ = writeln!(output);
        }
        let _ = writeln!(output, "Retired ids: {}", state.retired.len());
        let _ = writeln!(output, "Subscribers: {}", state.subscriptions.len());
        for (id, subscriber) in &state.subscriptions {
            let _ = writeln!(output, "  {:<20} -> {}", id.to_string(), subscriber.location());
        }
        output
    }
}
