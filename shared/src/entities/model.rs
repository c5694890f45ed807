use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    identity::{Identities, RdId},
    lifetime::Lifetime,
    protocol::Protocol,
};

use super::{
    bindable::{BindableCore, RdBindable, RdDynamic},
    error::BindError,
};

/// Named children of a composite entity.
#[derive(Default)]
pub(crate) struct Members {
    members: Mutex<Vec<(String, Arc<dyn RdBindable>)>>,
}

impl Members {
    pub(crate) fn add(&self, name: impl Into<String>, member: Arc<dyn RdBindable>) {
        self.members.lock().push((name.into(), member));
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.members.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn RdBindable>)> {
        self.members.lock().clone()
    }

    /// Each member gets `identities.mix(id, ".name")`, so both peers derive the same ids.
    pub(crate) fn identify(&self, identities: &dyn Identities, id: RdId) -> Result<(), BindError> {
        for (name, member) in self.snapshot() {
            member.try_identify(identities, identities.mix(id, &format!(".{}", name)))?;
        }
        Ok(())
    }

    pub(crate) fn bind(&self, lifetime: &Lifetime, parent: &dyn RdDynamic) -> Result<(), BindError> {
        for (name, member) in self.snapshot() {
            member.try_bind(lifetime, parent, &name)?;
        }
        Ok(())
    }
}

struct ModelInner {
    core: BindableCore,
    members: Members,
}

/// A composite entity that owns no wire traffic of its own and binds its members under
/// its own location.
///
/// Members must be added before the model is identified.
#[derive(Clone)]
pub struct RdModel {
    inner: Arc<ModelInner>,
}

impl RdModel {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ModelInner {
                core: BindableCore::new("model"),
                members: Members::default(),
            }),
        }
    }

    /// Adds `member` under `name` and returns the model for chaining.
    pub fn with_member(self, name: &str, member: impl RdBindable + 'static) -> Self {
        self.add_member(name, member);
        self
    }

    pub fn add_member(&self, name: &str, member: impl RdBindable + 'static) {
        self.inner.members.add(name, Arc::new(member));
    }

    pub fn member_names(&self) -> Vec<String> {
        self.inner.members.names()
    }
}

impl Default for RdModel {
    fn default() -> Self {
        Self::new()
    }
}

impl RdDynamic for RdModel {
    fn protocol(&self) -> Option<Arc<Protocol>> {
        self.inner.core.protocol()
    }

    fn location(&self) -> String {
        self.inner.core.location()
    }
}

impl RdBindable for RdModel {
    fn rd_id(&self) -> RdId {
        self.inner.core.rd_id()
    }

    fn try_identify(&self, identities: &dyn Identities, id: RdId) -> Result<(), BindError> {
        self.inner.core.identify(id)?;
        self.inner.members.identify(identities, id)
    }

    fn try_bind(&self, lifetime: &Lifetime, parent: &dyn RdDynamic, name: &str) -> Result<(), BindError> {
        let attached = self.inner.core.attach(lifetime, parent, name)?;
        if let Err(error) = self.inner.members.bind(&attached.binding, self) {
            attached.binding.terminate();
            return Err(error);
        }
        Ok(())
    }
}
