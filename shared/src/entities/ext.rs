use std::{collections::VecDeque, sync::Arc};

use log::{error, info, trace};
use parking_lot::Mutex;

use rd_serde::{Serde, SerdeErr, StreamWriter};

use crate::{
    identity::{Identities, RdId},
    lifetime::Lifetime,
    protocol::Protocol,
    reactive::Property,
    scheduler::Scheduler,
    wire::{RdWireable, Wire, WireError},
};

use super::{
    bindable::{BindableCore, RdBindable, RdDynamic},
    error::BindError,
    model::Members,
};

/// Handshake states exchanged on an extension's own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtState {
    Ready = 0,
    ReceivedCounterpart = 1,
    Disconnected = 2,
}

impl ExtState {
    fn from_i32(tag: i32) -> Result<Self, SerdeErr> {
        match tag {
            0 => Ok(ExtState::Ready),
            1 => Ok(ExtState::ReceivedCounterpart),
            2 => Ok(ExtState::Disconnected),
            _ => Err(SerdeErr::InvalidTag {
                type_name: "ExtState",
                tag: i64::from(tag),
            }),
        }
    }
}

/// The wire of an extension's child protocol. Outgoing messages wait in a queue until
/// the counterpart extension has been seen, then go out in order over the parent wire.
pub struct ExtWire {
    parent: Arc<dyn Wire>,
    connected: Property<bool>,
    pending: Mutex<VecDeque<(RdId, Vec<u8>)>>,
}

impl ExtWire {
    pub fn new(parent: Arc<dyn Wire>, connected: Property<bool>) -> Self {
        Self {
            parent,
            connected,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.value().unwrap_or(false)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
        if connected {
            self.flush();
        }
    }

    fn flush(&self) {
        loop {
            let next = self.pending.lock().pop_front();
            let Some((id, payload)) = next else {
                return;
            };
            self.parent.send(id, &payload);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Wire for ExtWire {
    fn send(&self, id: RdId, payload: &[u8]) {
        {
            let mut pending = self.pending.lock();
            if !self.is_connected() || !pending.is_empty() {
                trace!("ext wire: holding {} bytes for {} until connected", payload.len(), id);
                pending.push_back((id, payload.to_vec()));
                return;
            }
        }
        self.parent.send(id, payload);
    }

    fn try_advise(&self, lifetime: &Lifetime, entity: Arc<dyn RdWireable>) -> Result<(), WireError> {
        self.parent.try_advise(lifetime, entity)
    }

    fn try_advise_transient(&self, lifetime: &Lifetime, entity: Arc<dyn RdWireable>) -> Result<(), WireError> {
        self.parent.try_advise_transient(lifetime, entity)
    }

    fn connected(&self) -> &Property<bool> {
        &self.connected
    }
}

struct Bound {
    protocol: Arc<Protocol>,
    wire: Arc<ExtWire>,
}

struct ExtInner {
    core: BindableCore,
    members: Members,
    serialization_hash: i64,
    connected: Property<bool>,
    bound: Mutex<Option<Bound>>,
}

/// A sub-model with its own child protocol, bound lazily by each peer. Both ends
/// exchange `[state: i32][schema hash: i64]` on the extension's id; traffic of its
/// members is held back until the counterpart answers. A differing hash means the two
/// sides were built from different schemas: the extension is reported in
/// [`Protocol::out_of_sync_models`] and its binding is terminated.
#[derive(Clone)]
pub struct RdExt {
    inner: Arc<ExtInner>,
}

impl RdExt {
    pub fn new(serialization_hash: i64) -> Self {
        Self {
            inner: Arc::new(ExtInner {
                core: BindableCore::new("ext"),
                members: Members::default(),
                serialization_hash,
                connected: Property::named("ext.connected", Some(false)),
                bound: Mutex::new(None),
            }),
        }
    }

    pub fn with_member(self, name: &str, member: impl RdBindable + 'static) -> Self {
        self.add_member(name, member);
        self
    }

    pub fn add_member(&self, name: &str, member: impl RdBindable + 'static) {
        self.inner.members.add(name, Arc::new(member));
    }

    pub fn serialization_hash(&self) -> i64 {
        self.inner.serialization_hash
    }

    /// Whether the counterpart extension has been seen.
    pub fn connected(&self) -> &Property<bool> {
        &self.inner.connected
    }

    /// Outgoing member messages still waiting for the counterpart.
    pub fn pending_count(&self) -> usize {
        self.inner
            .bound
            .lock()
            .as_ref()
            .map_or(0, |bound| bound.wire.pending_count())
    }
}

impl ExtInner {
    fn send_state(&self, parent_wire: &Arc<dyn Wire>, state: ExtState) {
        let id = self.core.rd_id();
        if id.is_null() {
            return;
        }
        let mut writer = StreamWriter::new();
        (state as i32).ser(&mut writer);
        self.serialization_hash.ser(&mut writer);
        trace!("ext `{}` ({}) :: send {:?}", self.core.location(), id, state);
        parent_wire.send(id, &writer.to_bytes());
    }

    fn ext_wire(&self) -> Option<Arc<ExtWire>> {
        self.bound.lock().as_ref().map(|bound| bound.wire.clone())
    }
}

impl RdWireable for ExtInner {
    fn rd_id(&self) -> RdId {
        self.core.rd_id()
    }

    fn wire_scheduler(&self) -> Arc<dyn Scheduler> {
        self.core.scheduler()
    }

    fn on_wire_received(&self, payload: &[u8]) {
        let Some((parent, (state, hash))) = self.core.decode(payload, |_, reader| {
            let state = ExtState::from_i32(i32::de(reader)?)?;
            Ok((state, i64::de(reader)?))
        }) else {
            return;
        };
        let location = self.core.location();
        trace!("ext `{}` ({}) :: received {:?}", location, self.core.rd_id(), state);

        if hash != self.serialization_hash {
            error!(
                "ext `{}` :: schema hash mismatch, local {} vs remote {}; generated models are out of sync",
                location, self.serialization_hash, hash
            );
            parent.out_of_sync_models().add(location);
            self.core.terminate_binding();
            return;
        }

        let Some(wire) = self.ext_wire() else {
            return;
        };
        match state {
            ExtState::Ready => {
                self.send_state(parent.wire(), ExtState::ReceivedCounterpart);
                wire.set_connected(true);
            }
            ExtState::ReceivedCounterpart => wire.set_connected(true),
            ExtState::Disconnected => wire.set_connected(false),
        }
    }

    fn location(&self) -> String {
        self.core.location()
    }
}

impl RdDynamic for RdExt {
    /// Members bind to the extension's child protocol.
    fn protocol(&self) -> Option<Arc<Protocol>> {
        self.inner
            .bound
            .lock()
            .as_ref()
            .map(|bound| bound.protocol.clone())
    }

    fn location(&self) -> String {
        self.inner.core.location()
    }
}

impl RdBindable for RdExt {
    fn rd_id(&self) -> RdId {
        self.inner.core.rd_id()
    }

    fn try_identify(&self, identities: &dyn Identities, id: RdId) -> Result<(), BindError> {
        self.inner.core.identify(id)?;
        self.inner.members.identify(identities, id)
    }

    fn try_bind(&self, lifetime: &Lifetime, parent: &dyn RdDynamic, name: &str) -> Result<(), BindError> {
        let attached = self.inner.core.attach(lifetime, parent, name)?;
        let binding = attached.binding;
        let parent_wire = attached.protocol.wire().clone();

        let wire = Arc::new(ExtWire::new(parent_wire.clone(), self.inner.connected.clone()));
        let child = attached
            .protocol
            .child(self.inner.core.location(), wire.clone(), &binding);
        *self.inner.bound.lock() = Some(Bound {
            protocol: child,
            wire,
        });
        let weak = Arc::downgrade(&self.inner);
        let released = binding.try_on_termination(move || {
            if let Some(inner) = weak.upgrade() {
                inner.bound.lock().take();
            }
        });
        if released.is_err() {
            self.inner.bound.lock().take();
            return Err(BindError::LifetimeTerminated {
                name: name.to_string(),
            });
        }

        if let Err(error) = self.inner.members.bind(&binding, self) {
            binding.terminate();
            return Err(error);
        }

        let weak = Arc::downgrade(&self.inner);
        let disconnect_wire = parent_wire.clone();
        let disconnected = binding.try_on_termination(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.send_state(&disconnect_wire, ExtState::Disconnected);
            inner.connected.set(false);
        });
        if disconnected.is_err() {
            return Err(BindError::LifetimeTerminated {
                name: name.to_string(),
            });
        }

        // A counterpart that bound first may already be waiting; its handshake can be
        // delivered, and can end this binding, right here.
        if let Err(error) = parent_wire.try_advise(&binding, self.inner.clone()) {
            binding.terminate();
            return Err(error.into());
        }
        if !binding.is_alive() {
            return Ok(());
        }

        info!(
            "ext `{}` ({}) bound, waiting for counterpart",
            self.inner.core.location(),
            self.inner.core.rd_id()
        );
        self.inner.send_state(&parent_wire, ExtState::Ready);
        Ok(())
    }
}
