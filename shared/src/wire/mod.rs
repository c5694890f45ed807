mod error;
mod message_broker;
mod wire_base;

use std::sync::Arc;

pub use error::WireError;
pub use message_broker::{MessageBroker, DEFAULT_MAX_BUFFERED_PER_ID};
pub use wire_base::{Transport, WireBase};

use crate::{identity::RdId, lifetime::Lifetime, reactive::Property, scheduler::Scheduler};

/// Something that receives wire messages addressed to its id.
pub trait RdWireable: Send + Sync {
    fn rd_id(&self) -> RdId;

    /// The scheduler on which `on_wire_received` must run.
    fn wire_scheduler(&self) -> Arc<dyn Scheduler>;

    fn on_wire_received(&self, payload: &[u8]);

    /// Human readable path used in logs.
    fn location(&self) -> String {
        format!("<{}>", self.rd_id())
    }
}

/// An id-addressed duplex transport.
pub trait Wire: Send + Sync {
    fn send(&self, id: RdId, payload: &[u8]);

    /// Routes messages for `entity.rd_id()` to `entity` while `lifetime` is alive.
    fn try_advise(&self, lifetime: &Lifetime, entity: Arc<dyn RdWireable>) -> Result<(), WireError>;

    /// Like [`Wire::try_advise`], for an id that is never bound again, such as the id of
    /// a single RPC call. Messages arriving after the subscription ends are dropped.
    fn try_advise_transient(&self, lifetime: &Lifetime, entity: Arc<dyn RdWireable>) -> Result<(), WireError> {
        self.try_advise(lifetime, entity)
    }

    /// Panicking version of [`Wire::try_advise`].
    fn advise(&self, lifetime: &Lifetime, entity: Arc<dyn RdWireable>) {
        if let Err(error) = self.try_advise(lifetime, entity) {
            panic!("{}", error);
        }
    }

    fn connected(&self) -> &Property<bool>;
}
