use std::sync::{atomic::AtomicBool, Arc};

use log::{trace, warn};

use rd_serde::{Serde, SerdeErr};

use crate::{
    identity::{Identities, RdId},
    lifetime::Lifetime,
    protocol::{Protocol, ProtocolError, WireValue},
    reactive::{AdvisePriority, ListEvent, ViewableList},
    scheduler::Scheduler,
    wire::RdWireable,
};

use super::{
    bindable::{is_remote_change, BindableCore, ChangeScope, RdBindable, RdDynamic},
    error::BindError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListOp {
    Add = 0,
    Update = 1,
    Remove = 2,
}

impl ListOp {
    fn from_i32(tag: i32) -> Result<Self, SerdeErr> {
        match tag {
            0 => Ok(ListOp::Add),
            1 => Ok(ListOp::Update),
            2 => Ok(ListOp::Remove),
            _ => Err(SerdeErr::InvalidTag {
                type_name: "ListOp",
                tag: i64::from(tag),
            }),
        }
    }
}

struct ListInner<T> {
    core: BindableCore,
    list: ViewableList<T>,
    applying_remote: AtomicBool,
}

/// An ordered list mirrored on the peer. Messages are `[op: i32][index: i32][value]`,
/// the value being absent for removals.
pub struct RdList<T> {
    inner: Arc<ListInner<T>>,
}

impl<T> Clone for RdList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: WireValue + Clone> RdList<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ListInner {
                core: BindableCore::new("list"),
                list: ViewableList::named("rd_list"),
                applying_remote: AtomicBool::new(false),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.list.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.list.get(index)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.list.to_vec()
    }

    pub fn try_add(&self, value: T) -> Result<(), BindError> {
        self.inner.core.check_thread()?;
        let _local = ChangeScope::local(&self.inner.applying_remote);
        self.inner.list.add(value);
        Ok(())
    }

    pub fn add(&self, value: T) {
        if let Err(error) = self.try_add(value) {
            panic!("{}", error);
        }
    }

    pub fn insert(&self, index: usize, value: T) {
        self.inner.core.assert_thread();
        let _local = ChangeScope::local(&self.inner.applying_remote);
        self.inner.list.insert(index, value);
    }

    pub fn set(&self, index: usize, value: T) -> T {
        self.inner.core.assert_thread();
        let _local = ChangeScope::local(&self.inner.applying_remote);
        self.inner.list.set(index, value)
    }

    pub fn remove_at(&self, index: usize) -> T {
        self.inner.core.assert_thread();
        let _local = ChangeScope::local(&self.inner.applying_remote);
        self.inner.list.remove_at(index)
    }

    pub fn clear(&self) {
        self.inner.core.assert_thread();
        let _local = ChangeScope::local(&self.inner.applying_remote);
        self.inner.list.clear();
    }

    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&ListEvent<T>) + Send + Sync + 'static) {
        self.inner.list.advise(lifetime, handler);
    }

    pub fn view(&self, lifetime: &Lifetime, handler: impl Fn(&Lifetime, usize, &T) + Send + Sync + 'static) {
        self.inner.list.view(lifetime, handler);
    }
}

impl<T: WireValue + Clone> Default for RdList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: WireValue + Clone> ListInner<T> {
    fn send_event(&self, event: &ListEvent<T>) {
        let (op, index, value) = match event {
            ListEvent::Add { index, value } => (ListOp::Add, *index, Some(value)),
            ListEvent::Update { index, new, .. } => (ListOp::Update, *index, Some(new)),
            ListEvent::Remove { index, .. } => (ListOp::Remove, *index, None),
        };
        self.core.send(&format!("{:?} [{}]", op, index), |serializers, writer| {
            (op as i32).ser(writer);
            (index as i32).ser(writer);
            if let Some(value) = value {
                value.write_value(serializers, writer)?;
            }
            Ok(())
        });
    }
}

impl<T: WireValue + Clone> RdWireable for ListInner<T> {
    fn rd_id(&self) -> RdId {
        self.core.rd_id()
    }

    fn wire_scheduler(&self) -> Arc<dyn Scheduler> {
        self.core.scheduler()
    }

    fn on_wire_received(&self, payload: &[u8]) {
        let Some((_, (op, index, value))) = self.core.decode(payload, |serializers, reader| {
            let op = ListOp::from_i32(i32::de(reader)?)?;
            let index = i32::de(reader)?;
            if index < 0 {
                return Err(ProtocolError::Serde(SerdeErr::NegativeLength(index)));
            }
            let value = match op {
                ListOp::Remove => None,
                _ => Some(T::read_value(serializers, reader)?),
            };
            Ok((op, index as usize, value))
        }) else {
            return;
        };
        trace!("list `{}` ({}) :: received {:?} [{}]", self.core.location(), self.core.rd_id(), op, index);

        let _remote = ChangeScope::remote(&self.applying_remote);
        let applied = match (op, value) {
            (ListOp::Add, Some(value)) => self.list.try_insert(index, value).map(|_| ()),
            (ListOp::Update, Some(value)) => self.list.try_set(index, value).map(|_| ()),
            (_, _) => self.list.try_remove_at(index).map(|_| ()),
        };
        if let Err(error) = applied {
            warn!("list `{}` ({}) :: dropping {:?}: {}", self.core.location(), self.core.rd_id(), op, error);
        }
    }

    fn location(&self) -> String {
        self.core.location()
    }
}

impl<T: WireValue + Clone> RdDynamic for RdList<T> {
    fn protocol(&self) -> Option<Arc<Protocol>> {
        self.inner.core.protocol()
    }

    fn location(&self) -> String {
        self.inner.core.location()
    }
}

impl<T: WireValue + Clone> RdBindable for RdList<T> {
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

        // Replays the current contents as `Add`s, which transfers them to the peer.
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .list
            .advise_with(&attached.binding, AdvisePriority::Priority, move |event| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !is_remote_change(&inner.applying_remote) {
                    inner.send_event(event);
                }
            });
        Ok(())
    }
}
