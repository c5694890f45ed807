use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{error, trace, warn};
use parking_lot::Mutex;

use rd_serde::{Serde, SerdeErr};

use crate::{
    identity::{Identities, RdId},
    lifetime::Lifetime,
    protocol::{Protocol, WireValue},
    reactive::{AdvisePriority, MapEvent, ViewableMap},
    scheduler::Scheduler,
    wire::RdWireable,
};

use super::{
    bindable::{is_remote_change, BindableCore, ChangeScope, RdBindable, RdDynamic},
    error::BindError,
};

const VERSIONED_FLAG_SHIFT: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapOp {
    Add = 0,
    Update = 1,
    Remove = 2,
    Ack = 3,
}

impl MapOp {
    fn from_i32(tag: i32) -> Result<Self, SerdeErr> {
        match tag {
            0 => Ok(MapOp::Add),
            1 => Ok(MapOp::Update),
            2 => Ok(MapOp::Remove),
            3 => Ok(MapOp::Ack),
            _ => Err(SerdeErr::InvalidTag {
                type_name: "MapOp",
                tag: i64::from(tag),
            }),
        }
    }

    fn header(self, versioned: bool) -> i32 {
        (i32::from(versioned) << VERSIONED_FLAG_SHIFT) | self as i32
    }
}

/// What a master map does with an unversioned remote write to a key it has an
/// unacknowledged write for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapConflictPolicy {
    /// Drop the remote write; the master's pending value stands on both ends.
    #[default]
    RejectRemote,
    /// Apply the remote write locally anyway. The peer still ends up holding the
    /// master's value, so the two ends can disagree until the next master write.
    AcceptRemote,
}

enum Incoming<K, V> {
    Ack {
        version: i64,
        key: K,
    },
    Change {
        op: MapOp,
        versioned: bool,
        version: i64,
        key: K,
        value: Option<V>,
    },
}

struct Versions<K> {
    next_version: i64,
    pending: HashMap<K, i64>,
}

struct MapInner<K, V> {
    core: BindableCore,
    map: ViewableMap<K, V>,
    applying_remote: AtomicBool,
    master: AtomicBool,
    policy: Mutex<MapConflictPolicy>,
    versions: Mutex<Versions<K>>,
}

/// A key-value map mirrored on the peer.
///
/// Messages are `[header: i32][version: i64 if versioned][key][value for Add/Update]`
/// where `header = versioned << 8 | op`. Only a master versions its writes; the slave
/// applies every versioned write and answers it with an `Ack` carrying the same
/// version, which clears the key from the master's pending table.
pub struct RdMap<K, V> {
    inner: Arc<MapInner<K, V>>,
}

impl<K, V> Clone for RdMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> RdMap<K, V>
where
    K: WireValue + Clone + Eq + Hash,
    V: WireValue + Clone + PartialEq,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MapInner {
                core: BindableCore::new("map"),
                map: ViewableMap::named("rd_map"),
                applying_remote: AtomicBool::new(false),
                master: AtomicBool::new(false),
                policy: Mutex::new(MapConflictPolicy::default()),
                versions: Mutex::new(Versions {
                    next_version: 0,
                    pending: HashMap::new(),
                }),
            }),
        }
    }

    /// A map whose concurrent writes prevail over the peer's.
    pub fn master() -> Self {
        let map = Self::new();
        map.set_master(true);
        map
    }

    pub fn set_master(&self, master: bool) {
        self.inner.master.store(master, Ordering::Release);
    }

    pub fn is_master(&self) -> bool {
        self.inner.master.load(Ordering::Acquire)
    }

    pub fn set_conflict_policy(&self, policy: MapConflictPolicy) {
        *self.inner.policy.lock() = policy;
    }

    /// Number of master writes still waiting for the peer's `Ack`.
    pub fn pending_acks(&self) -> usize {
        self.inner.versions.lock().pending.len()
    }

    pub fn len(&self) -> usize {
        self.inner.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.map.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.map.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.map.contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.map.keys()
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner.map.entries()
    }

    pub fn try_set(&self, key: K, value: V) -> Result<Option<V>, BindError> {
        self.inner.core.check_thread()?;
        let _local = ChangeScope::local(&self.inner.applying_remote);
        Ok(self.inner.map.set(key, value))
    }

    /// Panicking version of [`RdMap::try_set`].
    pub fn set(&self, key: K, value: V) -> Option<V> {
        match self.try_set(key, value) {
            Ok(old) => old,
            Err(error) => panic!("{}", error),
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.core.assert_thread();
        let _local = ChangeScope::local(&self.inner.applying_remote);
        self.inner.map.remove(key)
    }

    pub fn clear(&self) {
        self.inner.core.assert_thread();
        let _local = ChangeScope::local(&self.inner.applying_remote);
        self.inner.map.clear();
    }

    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&MapEvent<K, V>) + Send + Sync + 'static) {
        self.inner.map.advise(lifetime, handler);
    }

    pub fn view(&self, lifetime: &Lifetime, handler: impl Fn(&Lifetime, &K, &V) + Send + Sync + 'static) {
        self.inner.map.view(lifetime, handler);
    }
}

impl<K, V> Default for RdMap<K, V>
where
    K: WireValue + Clone + Eq + Hash,
    V: WireValue + Clone + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MapInner<K, V>
where
    K: WireValue + Clone + Eq + Hash,
    V: WireValue + Clone + PartialEq,
{
    fn send_event(&self, event: &MapEvent<K, V>) {
        let (op, value) = match event {
            MapEvent::Add { value, .. } => (MapOp::Add, Some(value)),
            MapEvent::Update { new, .. } => (MapOp::Update, Some(new)),
            MapEvent::Remove { .. } => (MapOp::Remove, None),
        };
        let key = event.key();
        let versioned = self.master.load(Ordering::Acquire);
        let version = if versioned {
            let mut versions = self.versions.lock();
            versions.next_version += 1;
            let version = versions.next_version;
            versions.pending.insert(key.clone(), version);
            version
        } else {
            0
        };

        self.core.send(&format!("{:?} v{}", op, version), |serializers, writer| {
            op.header(versioned).ser(writer);
            if versioned {
                version.ser(writer);
            }
            key.write_value(serializers, writer)?;
            if let Some(value) = value {
                value.write_value(serializers, writer)?;
            }
            Ok(())
        });
    }

    fn send_ack(&self, version: i64, key: &K) {
        self.core.send(&format!("Ack v{}", version), |serializers, writer| {
            MapOp::Ack.header(true).ser(writer);
            version.ser(writer);
            key.write_value(serializers, writer)
        });
    }

    fn receive_ack(&self, version: i64, key: K) {
        let location = self.core.location();
        if !self.master.load(Ordering::Acquire) {
            warn!("map `{}` :: received Ack v{} but this end is not the master", location, version);
            return;
        }
        let mut versions = self.versions.lock();
        match versions.pending.get(&key).copied() {
            Some(pending) if pending == version => {
                versions.pending.remove(&key);
                trace!("map `{}` :: Ack v{} accepted", location, version);
            }
            Some(pending) if pending > version => {
                trace!("map `{}` :: late Ack v{}, waiting for v{}", location, version, pending);
            }
            Some(pending) => {
                error!(
                    "map `{}` :: Ack v{} is ahead of the pending write v{}",
                    location, version, pending
                );
            }
            None => {
                warn!("map `{}` :: unmatched Ack v{}, nothing pending for the key", location, version);
            }
        }
    }

    fn receive_change(&self, op: MapOp, versioned: bool, version: i64, key: K, value: Option<V>) {
        let master = self.master.load(Ordering::Acquire);
        let pending = if master && !versioned {
            self.versions.lock().pending.get(&key).copied()
        } else {
            None
        };
        let policy = *self.policy.lock();

        match pending {
            Some(pending) if policy == MapConflictPolicy::RejectRemote => {
                warn!(
                    "map `{}` :: rejected remote {:?}, local write v{} is still pending",
                    self.core.location(),
                    op,
                    pending
                );
            }
            _ => {
                let _remote = ChangeScope::remote(&self.applying_remote);
                match value {
                    Some(value) => {
                        self.map.set(key.clone(), value);
                    }
                    None => {
                        self.map.remove(&key);
                    }
                }
            }
        }

        if versioned {
            self.send_ack(version, &key);
            if master {
                error!("map `{}` :: both ends are masters", self.core.location());
            }
        }
    }
}

impl<K, V> RdWireable for MapInner<K, V>
where
    K: WireValue + Clone + Eq + Hash,
    V: WireValue + Clone + PartialEq,
{
    fn rd_id(&self) -> RdId {
        self.core.rd_id()
    }

    fn wire_scheduler(&self) -> Arc<dyn Scheduler> {
        self.core.scheduler()
    }

    fn on_wire_received(&self, payload: &[u8]) {
        let Some((_, incoming)) = self.core.decode(payload, |serializers, reader| {
            let header = i32::de(reader)?;
            let op = MapOp::from_i32(header & 0xff)?;
            let versioned = (header >> VERSIONED_FLAG_SHIFT) & 1 == 1;
            if op == MapOp::Ack {
                let version = i64::de(reader)?;
                let key = K::read_value(serializers, reader)?;
                return Ok(Incoming::Ack { version, key });
            }
            let version = if versioned { i64::de(reader)? } else { 0 };
            let key = K::read_value(serializers, reader)?;
            let value = match op {
                MapOp::Add | MapOp::Update => Some(V::read_value(serializers, reader)?),
                _ => None,
            };
            Ok(Incoming::Change {
                op,
                versioned,
                version,
                key,
                value,
            })
        }) else {
            return;
        };

        match incoming {
            Incoming::Ack { version, key } => self.receive_ack(version, key),
            Incoming::Change {
                op,
                versioned,
                version,
                key,
                value,
            } => {
                trace!(
                    "map `{}` ({}) :: received {:?} v{}",
                    self.core.location(),
                    self.core.rd_id(),
                    op,
                    version
                );
                self.receive_change(op, versioned, version, key, value);
            }
        }
    }

    fn location(&self) -> String {
        self.core.location()
    }
}

impl<K, V> RdDynamic for RdMap<K, V>
where
    K: WireValue + Clone + Eq + Hash,
    V: WireValue + Clone + PartialEq,
{
    fn protocol(&self) -> Option<Arc<Protocol>> {
        self.inner.core.protocol()
    }

    fn location(&self) -> String {
        self.inner.core.location()
    }
}

impl<K, V> RdBindable for RdMap<K, V>
where
    K: WireValue + Clone + Eq + Hash,
    V: WireValue + Clone + PartialEq,
{
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
            .map
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
