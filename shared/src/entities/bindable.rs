use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};

use log::{error, trace, warn};
use parking_lot::Mutex;

use rd_serde::{StreamReader, StreamWriter};

use crate::{
    identity::{Identities, RdId},
    lifetime::{Lifetime, LifetimeDefinition},
    protocol::{Protocol, ProtocolError, Serializers},
    scheduler::{Scheduler, SynchronousScheduler},
};

use super::error::BindError;

/// Anything that can act as the parent of a binding: a protocol or a bound entity.
pub trait RdDynamic: Send + Sync {
    /// The protocol this node is attached to, `None` while unbound.
    fn protocol(&self) -> Option<Arc<Protocol>>;

    /// Dotted path used in logs, e.g. `server.users.name`.
    fn location(&self) -> String;
}

/// A synchronized entity. Lifecycle: constructed unbound, `identify` assigns its id,
/// `bind` attaches it to a protocol under a lifetime, and the lifetime's termination
/// detaches it again and clears the id.
pub trait RdBindable: RdDynamic {
    fn rd_id(&self) -> RdId;

    /// Assigns `id` to this entity and derived ids to its children.
    fn try_identify(&self, identities: &dyn Identities, id: RdId) -> Result<(), BindError>;

    /// Panicking version of [`RdBindable::try_identify`].
    fn identify(&self, identities: &dyn Identities, id: RdId) {
        if let Err(error) = self.try_identify(identities, id) {
            panic!("{}", error);
        }
    }

    fn try_bind(&self, lifetime: &Lifetime, parent: &dyn RdDynamic, name: &str) -> Result<(), BindError>;

    /// Panicking version of [`RdBindable::try_bind`].
    fn bind(&self, lifetime: &Lifetime, parent: &dyn RdDynamic, name: &str) {
        if let Err(error) = self.try_bind(lifetime, parent, name) {
            panic!("{}", error);
        }
    }

    fn is_bound(&self) -> bool {
        self.protocol().is_some()
    }
}

fn unbound_scheduler() -> Arc<dyn Scheduler> {
    static UNBOUND: OnceLock<Arc<dyn Scheduler>> = OnceLock::new();
    UNBOUND
        .get_or_init(|| Arc::new(SynchronousScheduler::new()))
        .clone()
}

struct BindState {
    rd_id: RdId,
    location: String,
    protocol: Option<Arc<Protocol>>,
    binding: Option<LifetimeDefinition>,
}

/// What a successful attach hands back to the entity.
pub(crate) struct Attached {
    pub(crate) protocol: Arc<Protocol>,
    pub(crate) binding: LifetimeDefinition,
}

/// Bookkeeping shared by every entity kind: id, location, protocol and the lifetime
/// of the current binding.
pub(crate) struct BindableCore {
    kind: &'static str,
    state: Arc<Mutex<BindState>>,
}

impl BindableCore {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(BindState {
                rd_id: RdId::NULL,
                location: format!("<unbound {}>", kind),
                protocol: None,
                binding: None,
            })),
        }
    }

    pub(crate) fn rd_id(&self) -> RdId {
        self.state.lock().rd_id
    }

    pub(crate) fn location(&self) -> String {
        self.state.lock().location.clone()
    }

    pub(crate) fn protocol(&self) -> Option<Arc<Protocol>> {
        self.state.lock().protocol.clone()
    }

    /// The lifetime of the current binding.
    pub(crate) fn binding(&self) -> Option<Lifetime> {
        self.state
            .lock()
            .binding
            .as_ref()
            .map(|binding| binding.lifetime().clone())
    }

    /// Ends the current binding, if any.
    pub(crate) fn terminate_binding(&self) {
        let binding = self.state.lock().binding.clone();
        if let Some(binding) = binding {
            binding.terminate();
        }
    }

    /// The scheduler wire messages for this entity are delivered on. An unbound entity
    /// reports one shared synchronous scheduler.
    pub(crate) fn scheduler(&self) -> Arc<dyn Scheduler> {
        match self.protocol() {
            Some(protocol) => protocol.scheduler().clone(),
            None => unbound_scheduler(),
        }
    }

    pub(crate) fn identify(&self, id: RdId) -> Result<(), BindError> {
        if id.is_null() {
            return Err(BindError::NullId);
        }
        let mut state = self.state.lock();
        if !state.rd_id.is_null() {
            return Err(BindError::AlreadyIdentified { id: state.rd_id });
        }
        state.rd_id = id;
        Ok(())
    }

    /// Attaches to `parent`'s protocol under a fresh child of `lifetime`. The returned
    /// binding lifetime detaches the entity and clears its id when it terminates.
    pub(crate) fn attach(
        &self,
        lifetime: &Lifetime,
        parent: &dyn RdDynamic,
        name: &str,
    ) -> Result<Attached, BindError> {
        {
            let state = self.state.lock();
            if state.rd_id.is_null() {
                return Err(BindError::NotIdentified {
                    name: name.to_string(),
                });
            }
            if state.protocol.is_some() {
                return Err(BindError::AlreadyBound {
                    location: state.location.clone(),
                });
            }
        }

        let protocol = parent.protocol().ok_or_else(|| BindError::ParentNotBound {
            parent: parent.location(),
            name: name.to_string(),
        })?;
        protocol.scheduler().try_assert_thread()?;

        let binding = lifetime.create_nested();
        let weak_state = Arc::downgrade(&self.state);
        let kind = self.kind;
        let unbind = move || {
            let Some(state) = weak_state.upgrade() else {
                return;
            };
            let mut state = state.lock();
            trace!("{} `{}` ({}) unbound", kind, state.location, state.rd_id);
            state.protocol = None;
            state.binding = None;
            state.rd_id = RdId::NULL;
        };
        if binding.try_on_termination(unbind).is_err() {
            return Err(BindError::LifetimeTerminated {
                name: name.to_string(),
            });
        }

        let mut state = self.state.lock();
        state.location = format!("{}.{}", parent.location(), name);
        state.protocol = Some(protocol.clone());
        state.binding = Some(binding.clone());
        trace!("{} `{}` ({}) bound", kind, state.location, state.rd_id);
        Ok(Attached { protocol, binding })
    }

    /// Local mutations of a bound entity must happen on its protocol's scheduler.
    pub(crate) fn check_thread(&self) -> Result<(), BindError> {
        match self.protocol() {
            Some(protocol) => Ok(protocol.scheduler().try_assert_thread()?),
            None => Ok(()),
        }
    }

    /// Panicking version of [`BindableCore::check_thread`].
    pub(crate) fn assert_thread(&self) {
        if let Err(error) = self.check_thread() {
            panic!("{}", error);
        }
    }

    /// Serializes a message with `write` and sends it on this entity's id. Does nothing
    /// while unbound.
    pub(crate) fn send(
        &self,
        description: &str,
        write: impl FnOnce(&Serializers, &mut StreamWriter) -> Result<(), ProtocolError>,
    ) {
        let (protocol, id, location) = {
            let state = self.state.lock();
            let Some(protocol) = state.protocol.clone() else {
                return;
            };
            (protocol, state.rd_id, state.location.clone())
        };

        let mut writer = StreamWriter::new();
        if let Err(error) = write(protocol.serializers(), &mut writer) {
            error!("{} `{}` ({}) :: failed to serialize {}: {}", self.kind, location, id, description, error);
            return;
        }
        trace!("{} `{}` ({}) :: send {}", self.kind, location, id, description);
        protocol.wire().send(id, &writer.to_bytes());
    }

    /// Decodes an inbound payload. Malformed payloads are logged and dropped.
    pub(crate) fn decode<R>(
        &self,
        payload: &[u8],
        read: impl FnOnce(&Serializers, &mut StreamReader) -> Result<R, ProtocolError>,
    ) -> Option<(Arc<Protocol>, R)> {
        let Some(protocol) = self.protocol() else {
            trace!("{} `{}` :: message after unbind dropped", self.kind, self.location());
            return None;
        };
        let mut reader = StreamReader::new(payload);
        match read(protocol.serializers(), &mut reader) {
            Ok(value) => Some((protocol, value)),
            Err(error) => {
                warn!(
                    "{} `{}` ({}) :: dropping malformed message: {}",
                    self.kind,
                    self.location(),
                    self.rd_id(),
                    error
                );
                None
            }
        }
    }
}

/// Records where the change currently being applied to an entity came from. A remote
/// scope mutes the entity's own change handler so it does not echo the change back; a
/// local scope, entered by every public mutator, unmutes it again so writes made by
/// subscribers while a remote change is applied still reach the peer. Restores the
/// previous origin on drop.
pub(crate) struct ChangeScope<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl<'a> ChangeScope<'a> {
    pub(crate) fn remote(flag: &'a AtomicBool) -> Self {
        Self::enter(flag, true)
    }

    pub(crate) fn local(flag: &'a AtomicBool) -> Self {
        Self::enter(flag, false)
    }

    fn enter(flag: &'a AtomicBool, remote: bool) -> Self {
        let previous = flag.swap(remote, Ordering::AcqRel);
        Self { flag, previous }
    }
}

impl Drop for ChangeScope<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::Release);
    }
}

pub(crate) fn is_remote_change(flag: &AtomicBool) -> bool {
    flag.load(Ordering::Acquire)
}
