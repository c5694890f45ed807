use std::sync::{Arc, Weak};

use log::{debug, info};

use crate::{
    entities::{BindError, RdBindable, RdDynamic},
    identity::{Identities, RdId, SequentialIdentities},
    lifetime::Lifetime,
    reactive::ViewableSet,
    scheduler::Scheduler,
    wire::{MessageBroker, Transport, Wire, WireBase},
};

use super::{config::ProtocolConfig, serializers::Serializers};

/// One endpoint of a connection: the scheduler everything bound to it runs on, the wire
/// it talks over, and the registries shared by every entity bound beneath it.
pub struct Protocol {
    name: String,
    config: ProtocolConfig,
    serializers: Arc<Serializers>,
    identities: Arc<dyn Identities>,
    scheduler: Arc<dyn Scheduler>,
    wire: Arc<dyn Wire>,
    lifetime: Lifetime,
    out_of_sync_models: ViewableSet<String>,
    this: Weak<Protocol>,
}

impl Protocol {
    pub fn new(
        config: ProtocolConfig,
        serializers: Arc<Serializers>,
        identities: Arc<dyn Identities>,
        scheduler: Arc<dyn Scheduler>,
        wire: Arc<dyn Wire>,
        lifetime: &Lifetime,
    ) -> Arc<Self> {
        info!(
            "protocol `{}` created ({:?} ids, scheduler `{}`)",
            config.name,
            identities.kind(),
            scheduler.name()
        );
        Self::assemble(
            config.name.clone(),
            config,
            serializers,
            identities,
            scheduler,
            wire,
            lifetime,
            ViewableSet::named("out_of_sync_models"),
        )
    }

    /// Builds a protocol together with the [`WireBase`] that frames its messages onto
    /// `transport`. Inbound frames are fed to the returned wire.
    pub fn over_transport(
        config: ProtocolConfig,
        scheduler: Arc<dyn Scheduler>,
        transport: Arc<dyn Transport>,
        lifetime: &Lifetime,
    ) -> (Arc<Self>, Arc<WireBase>) {
        let broker = MessageBroker::with_capacity(scheduler.clone(), config.max_buffered_messages_per_id);
        let wire = Arc::new(WireBase::with_broker(broker, transport));
        let identities = Arc::new(SequentialIdentities::new(config.id_kind));
        let protocol = Self::new(
            config,
            Arc::new(Serializers::new()),
            identities,
            scheduler,
            wire.clone(),
            lifetime,
        );
        (protocol, wire)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        name: String,
        config: ProtocolConfig,
        serializers: Arc<Serializers>,
        identities: Arc<dyn Identities>,
        scheduler: Arc<dyn Scheduler>,
        wire: Arc<dyn Wire>,
        lifetime: &Lifetime,
        out_of_sync_models: ViewableSet<String>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name,
            config,
            serializers,
            identities,
            scheduler,
            wire,
            lifetime: lifetime.clone(),
            out_of_sync_models,
            this: this.clone(),
        })
    }

    /// A protocol for a sub-model with its own wire. Everything else is shared with `self`.
    pub fn child(&self, name: impl Into<String>, wire: Arc<dyn Wire>, lifetime: &Lifetime) -> Arc<Self> {
        let name = name.into();
        debug!("protocol `{}`: creating child `{}`", self.name, name);
        Self::assemble(
            name,
            self.config.clone(),
            self.serializers.clone(),
            self.identities.clone(),
            self.scheduler.clone(),
            wire,
            lifetime,
            self.out_of_sync_models.clone(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn serializers(&self) -> &Arc<Serializers> {
        &self.serializers
    }

    pub fn identities(&self) -> &Arc<dyn Identities> {
        &self.identities
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn wire(&self) -> &Arc<dyn Wire> {
        &self.wire
    }

    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    /// Locations of extensions whose peer reported a different schema hash.
    pub fn out_of_sync_models(&self) -> &ViewableSet<String> {
        &self.out_of_sync_models
    }

    /// Identifies `entity` with the stable id derived from `name` and binds it at the
    /// top level of this protocol. Both peers must use the same name.
    pub fn try_bind_static(&self, entity: &dyn RdBindable, name: &str) -> Result<(), BindError> {
        let id = self.identities.mix(RdId::NULL, name);
        self.try_bind_with_id(entity, id, name)
    }

    /// Panicking version of [`Protocol::try_bind_static`].
    pub fn bind_static(&self, entity: &dyn RdBindable, name: &str) {
        if let Err(error) = self.try_bind_static(entity, name) {
            panic!("{}", error);
        }
    }

    /// Like [`Protocol::try_bind_static`], with an explicit id from the static range.
    pub fn try_bind_static_id(&self, entity: &dyn RdBindable, static_id: i64, name: &str) -> Result<(), BindError> {
        let id = RdId::try_static(static_id)?;
        self.try_bind_with_id(entity, id, name)
    }

    fn try_bind_with_id(&self, entity: &dyn RdBindable, id: RdId, name: &str) -> Result<(), BindError> {
        entity.try_identify(self.identities.as_ref(), id)?;
        entity.try_bind(&self.lifetime, self, name)
    }
}

impl RdDynamic for Protocol {
    fn protocol(&self) -> Option<Arc<Protocol>> {
        self.this.upgrade()
    }

    fn location(&self) -> String {
        self.name.clone()
    }
}
