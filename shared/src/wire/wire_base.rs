use std::sync::Arc;

use log::{trace, warn};

use rd_serde::{Serde, StreamReader, StreamWriter};

use crate::{
    identity::RdId,
    lifetime::Lifetime,
    reactive::Property,
    scheduler::Scheduler,
};

use super::{error::WireError, message_broker::MessageBroker, RdWireable, Wire};

/// The byte pipe underneath a [`WireBase`]. Implementations deliver whole frames,
/// in order, to the peer's [`WireBase::receive_frame`].
pub trait Transport: Send + Sync {
    fn send_frame(&self, frame: Vec<u8>);
}

/// A [`Wire`] that frames messages as `[id: i64][payload]` over a [`Transport`] and
/// routes inbound frames through a [`MessageBroker`].
pub struct WireBase {
    broker: MessageBroker,
    transport: Arc<dyn Transport>,
    connected: Property<bool>,
}

impl WireBase {
    pub fn new(scheduler: Arc<dyn Scheduler>, transport: Arc<dyn Transport>) -> Self {
        Self::with_broker(MessageBroker::new(scheduler), transport)
    }

    pub fn with_broker(broker: MessageBroker, transport: Arc<dyn Transport>) -> Self {
        Self {
            broker,
            transport,
            connected: Property::named("wire.connected", Some(false)),
        }
    }

    pub fn broker(&self) -> &MessageBroker {
        &self.broker
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
    }

    /// Decodes one inbound frame and hands it to the broker.
    pub fn receive_frame(&self, frame: &[u8]) -> Result<(), WireError> {
        let mut reader = StreamReader::new(frame);
        let id = RdId::de(&mut reader)?;
        let payload = reader.rest().to_vec();
        trace!("wire: received {} bytes for {}", payload.len(), id);
        self.broker.dispatch(id, payload)
    }
}

impl Wire for WireBase {
    fn send(&self, id: RdId, payload: &[u8]) {
        if id.is_null() {
            warn!("wire: refusing to send {} bytes to null id", payload.len());
            return;
        }
        let mut writer = StreamWriter::new();
        id.ser(&mut writer);
        writer.write_bytes(payload);
        trace!("wire: sending {} bytes to {}", payload.len(), id);
        self.transport.send_frame(writer.to_bytes());
    }

    fn try_advise(&self, lifetime: &Lifetime, entity: Arc<dyn RdWireable>) -> Result<(), WireError> {
        self.broker.try_advise_on(lifetime, entity)
    }

    fn try_advise_transient(&self, lifetime: &Lifetime, entity: Arc<dyn RdWireable>) -> Result<(), WireError> {
        self.broker.try_advise_transient_on(lifetime, entity)
    }

    fn connected(&self) -> &Property<bool> {
        &self.connected
    }
}
