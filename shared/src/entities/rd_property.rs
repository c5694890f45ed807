use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::trace;

use crate::{
    identity::{Identities, RdId},
    lifetime::Lifetime,
    protocol::{Protocol, WireValue},
    reactive::{AdvisePriority, Property, Signal},
    scheduler::Scheduler,
    wire::RdWireable,
};

use super::{
    bindable::{is_remote_change, BindableCore, ChangeScope, RdBindable, RdDynamic},
    error::BindError,
};

struct PropertyInner<T> {
    core: BindableCore,
    property: Property<T>,
    applying_remote: AtomicBool,
    set_locally: AtomicBool,
}

/// A property whose value is mirrored on the peer. The payload of every message is
/// simply the serialized value.
///
/// A value given at construction is a default and is not pushed to the peer on bind;
/// a value set through [`RdProperty::set`] is.
pub struct RdProperty<T> {
    inner: Arc<PropertyInner<T>>,
}

impl<T> Clone for RdProperty<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: WireValue + Clone + PartialEq> RdProperty<T> {
    pub fn new(default: T) -> Self {
        Self::with_value(Some(default))
    }

    pub fn empty() -> Self {
        Self::with_value(None)
    }

    fn with_value(value: Option<T>) -> Self {
        Self {
            inner: Arc::new(PropertyInner {
                core: BindableCore::new("property"),
                property: Property::named("rd_property", value),
                applying_remote: AtomicBool::new(false),
                set_locally: AtomicBool::new(false),
            }),
        }
    }

    pub fn value(&self) -> Option<T> {
        self.inner.property.value()
    }

    pub fn has_value(&self) -> bool {
        self.inner.property.has_value()
    }

    pub fn try_set(&self, value: T) -> Result<(), BindError> {
        self.inner.core.check_thread()?;
        self.inner.set_locally.store(true, Ordering::Release);
        let _local = ChangeScope::local(&self.inner.applying_remote);
        self.inner.property.set(value);
        Ok(())
    }

    /// Panicking version of [`RdProperty::try_set`].
    pub fn set(&self, value: T) {
        if let Err(error) = self.try_set(value) {
            panic!("{}", error);
        }
    }

    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&T) + Send + Sync + 'static) {
        self.inner.property.advise(lifetime, handler);
    }

    pub fn view(&self, lifetime: &Lifetime, handler: impl Fn(&Lifetime, &T) + Send + Sync + 'static) {
        self.inner.property.view(lifetime, handler);
    }

    pub fn change(&self) -> &Signal<T> {
        self.inner.property.change()
    }
}

impl<T: WireValue + Clone + PartialEq> RdWireable for PropertyInner<T> {
    fn rd_id(&self) -> RdId {
        self.core.rd_id()
    }

    fn wire_scheduler(&self) -> Arc<dyn Scheduler> {
        self.core.scheduler()
    }

    fn on_wire_received(&self, payload: &[u8]) {
        let Some((_, value)) = self
            .core
            .decode(payload, |serializers, reader| T::read_value(serializers, reader))
        else {
            return;
        };
        trace!("property `{}` ({}) :: received value", self.core.location(), self.core.rd_id());
        let _remote = ChangeScope::remote(&self.applying_remote);
        self.property.set(value);
    }

    fn location(&self) -> String {
        self.core.location()
    }
}

impl<T: WireValue + Clone + PartialEq> RdDynamic for RdProperty<T> {
    fn protocol(&self) -> Option<Arc<Protocol>> {
        self.inner.core.protocol()
    }

    fn location(&self) -> String {
        self.inner.core.location()
    }
}

impl<T: WireValue + Clone + PartialEq> RdBindable for RdProperty<T> {
    fn rd_id(&self) -> RdId {
        self.inner.core.rd_id()
    }

    fn try_identify(&self, _identities: &dyn Identities, id: RdId) -> Result<(), BindError> {
        self.inner.core.identify(id)
    }

    fn try_bind(&self, lifetime: &Lifetime, parent: &dyn RdDynamic, name: &str) -> Result<(), BindError> {
        let attached = self.inner.core.attach(lifetime, parent, name)?;
        if let Err(error) = attached
            .protocol
            .wire()
            .try_advise(&attached.binding, self.inner.clone())
        {
            attached.binding.terminate();
            return Err(error.into());
        }

        let weak = Arc::downgrade(&self.inner);
        // A constructor default stays local: the advise below replays it muted.
        let replay = if self.inner.set_locally.load(Ordering::Acquire) {
            None
        } else {
            Some(ChangeScope::remote(&self.inner.applying_remote))
        };
        self.inner
            .property
            .advise_with(&attached.binding, AdvisePriority::Priority, move |value| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if is_remote_change(&inner.applying_remote) {
                    return;
                }
                inner
                    .core
                    .send("value", |serializers, writer| value.write_value(serializers, writer));
            });
        drop(replay);
        Ok(())
    }
}
