use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::{
    identity::{Identities, RdId},
    lifetime::Lifetime,
    protocol::{Protocol, WireValue},
    reactive::Signal,
    scheduler::Scheduler,
    wire::RdWireable,
};

use super::{
    bindable::{BindableCore, RdBindable, RdDynamic},
    error::BindError,
};

struct SignalInner<T> {
    core: BindableCore,
    signal: Signal<T>,
    wire_scheduler: Mutex<Option<Arc<dyn Scheduler>>>,
}

/// A fire-and-forget event source shared with the peer. Firing on either side runs the
/// handlers on both.
pub struct RdSignal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for RdSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: WireValue> RdSignal<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                core: BindableCore::new("signal"),
                signal: Signal::named("rd_signal"),
                wire_scheduler: Mutex::new(None),
            }),
        }
    }

    /// Delivers remote firings on `scheduler` instead of the protocol's scheduler.
    /// Takes effect at the next bind.
    pub fn set_wire_scheduler(&self, scheduler: Arc<dyn Scheduler>) {
        *self.inner.wire_scheduler.lock() = Some(scheduler);
    }

    pub fn try_fire(&self, value: T) -> Result<(), BindError> {
        self.inner.core.check_thread()?;
        self.inner
            .core
            .send("fire", |serializers, writer| value.write_value(serializers, writer));
        self.inner.signal.fire(&value);
        Ok(())
    }

    /// Panicking version of [`RdSignal::try_fire`].
    pub fn fire(&self, value: T) {
        if let Err(error) = self.try_fire(value) {
            panic!("{}", error);
        }
    }

    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&T) + Send + Sync + 'static) {
        self.inner.signal.advise(lifetime, handler);
    }

    pub fn signal(&self) -> &Signal<T> {
        &self.inner.signal
    }
}

impl<T: WireValue> Default for RdSignal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: WireValue> RdWireable for SignalInner<T> {
    fn rd_id(&self) -> RdId {
        self.core.rd_id()
    }

    fn wire_scheduler(&self) -> Arc<dyn Scheduler> {
        match self.wire_scheduler.lock().clone() {
            Some(scheduler) => scheduler,
            None => self.core.scheduler(),
        }
    }

    fn on_wire_received(&self, payload: &[u8]) {
        let Some((_, value)) = self
            .core
            .decode(payload, |serializers, reader| T::read_value(serializers, reader))
        else {
            return;
        };
        trace!("signal `{}` ({}) :: received", self.core.location(), self.core.rd_id());
        self.signal.fire(&value);
    }

    fn location(&self) -> String {
        self.core.location()
    }
}

impl<T: WireValue> RdDynamic for RdSignal<T> {
    fn protocol(&self) -> Option<Arc<Protocol>> {
        self.inner.core.protocol()
    }

    fn location(&self) -> String {
        self.inner.core.location()
    }
}

impl<T: WireValue> RdBindable for RdSignal<T> {
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
        Ok(())
    }
}
