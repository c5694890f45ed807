use std::{
    hash::Hash,
    sync::{atomic::AtomicBool, Arc},
};

use log::trace;

use rd_serde::{Serde, SerdeErr};

use crate::{
    identity::{Identities, RdId},
    lifetime::Lifetime,
    protocol::{Protocol, WireValue},
    reactive::{AdvisePriority, SetEvent, ViewableSet},
    scheduler::Scheduler,
    wire::RdWireable,
};

use super::{
    bindable::{is_remote_change, BindableCore, ChangeScope, RdBindable, RdDynamic},
    error::BindError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetOp {
    Add = 0,
    Remove = 1,
}

impl SetOp {
    fn from_i32(tag: i32) -> Result<Self, SerdeErr> {
        match tag {
            0 => Ok(SetOp::Add),
            1 => Ok(SetOp::Remove),
            _ => Err(SerdeErr::InvalidTag {
                type_name: "SetOp",
                tag: i64::from(tag),
            }),
        }
    }
}

struct SetInner<T> {
    core: BindableCore,
    set: ViewableSet<T>,
    applying_remote: AtomicBool,
}

/// A set mirrored on the peer. Messages are `[op: i32][value]`. Duplicate adds and
/// removals of absent values are absorbed by the set itself.
pub struct RdSet<T> {
    inner: Arc<SetInner<T>>,
}

impl<T> Clone for RdSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: WireValue + Clone + Eq + Hash> RdSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SetInner {
                core: BindableCore::new("set"),
                set: ViewableSet::named("rd_set"),
                applying_remote: AtomicBool::new(false),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.set.is_empty()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.inner.set.contains(value)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.set.to_vec()
    }

    pub fn try_add(&self, value: T) -> Result<bool, BindError> {
        self.inner.core.check_thread()?;
        let _local = ChangeScope::local(&self.inner.applying_remote);
        Ok(self.inner.set.add(value))
    }

    pub fn add(&self, value: T) -> bool {
        match self.try_add(value) {
            Ok(added) => added,
            Err(error) => panic!("{}", error),
        }
    }

    pub fn remove(&self, value: &T) -> bool {
        self.inner.core.assert_thread();
        let _local = ChangeScope::local(&self.inner.applying_remote);
        self.inner.set.remove(value)
    }

    pub fn clear(&self) {
        self.inner.core.assert_thread();
        let _local = ChangeScope::local(&self.inner.applying_remote);
        self.inner.set.clear();
    }

    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&SetEvent<T>) + Send + Sync + 'static) {
        self.inner.set.advise(lifetime, handler);
    }

    pub fn view(&self, lifetime: &Lifetime, handler: impl Fn(&Lifetime, &T) + Send + Sync + 'static) {
        self.inner.set.view(lifetime, handler);
    }
}

impl<T: WireValue + Clone + Eq + Hash> Default for RdSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: WireValue + Clone + Eq + Hash> RdWireable for SetInner<T> {
    fn rd_id(&self) -> RdId {
        self.core.rd_id()
    }

    fn wire_scheduler(&self) -> Arc<dyn Scheduler> {
        self.core.scheduler()
    }

    fn on_wire_received(&self, payload: &[u8]) {
        let Some((_, (op, value))) = self.core.decode(payload, |serializers, reader| {
            let op = SetOp::from_i32(i32::de(reader)?)?;
            Ok((op, T::read_value(serializers, reader)?))
        }) else {
            return;
        };
        trace!("set `{}` ({}) :: received {:?}", self.core.location(), self.core.rd_id(), op);

        let _remote = ChangeScope::remote(&self.applying_remote);
        match op {
            SetOp::Add => self.set.add(value),
            SetOp::Remove => self.set.remove(&value),
        };
    }

    fn location(&self) -> String {
        self.core.location()
    }
}

impl<T: WireValue + Clone + Eq + Hash> RdDynamic for RdSet<T> {
    fn protocol(&self) -> Option<Arc<Protocol>> {
        self.inner.core.protocol()
    }

    fn location(&self) -> String {
        self.inner.core.location()
    }
}

impl<T: WireValue + Clone + Eq + Hash> RdBindable for RdSet<T> {
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
        self.inner
            .set
            .advise_with(&attached.binding, AdvisePriority::Priority, move |event| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if is_remote_change(&inner.applying_remote) {
                    return;
                }
                let op = match event {
                    SetEvent::Add(_) => SetOp::Add,
                    SetEvent::Remove(_) => SetOp::Remove,
                };
                inner.core.send(&format!("{:?}", op), |serializers, writer| {
                    (op as i32).ser(writer);
                    event.value().write_value(serializers, writer)
                });
            });
        Ok(())
    }
}
