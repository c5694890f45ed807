use std::sync::atomic::{AtomicI64, Ordering};

use super::rd_id::RdId;

/// Which side of a connection allocates an id range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Client,
    Server,
}

/// Allocates fresh dynamic ids and derives stable child ids.
pub trait Identities: Send + Sync {
    fn kind(&self) -> IdKind;

    /// A fresh id that cannot collide with the counterpart's allocations.
    fn next(&self, parent: RdId) -> RdId;

    /// A stable child id derived from `parent` and a name.
    fn mix(&self, parent: RdId, tail: &str) -> RdId;

    fn mix_i64(&self, parent: RdId, tail: i64) -> RdId;
}

// Stable ids carry the top bit so they never meet the sequential counters.
const STABLE_MASK: i64 = i64::MIN;

/// Client ids count up from `MAX_STATIC_ID` in even steps, server ids from
/// `MAX_STATIC_ID + 1` in odd steps. The parent id is ignored so that creation order
/// differences between peers cannot produce collisions.
pub struct SequentialIdentities {
    kind: IdKind,
    counter: AtomicI64,
}

impl SequentialIdentities {
    pub fn new(kind: IdKind) -> Self {
        let base = match kind {
            IdKind::Client => RdId::MAX_STATIC_ID,
            IdKind::Server => RdId::MAX_STATIC_ID + 1,
        };
        Self {
            kind,
            counter: AtomicI64::new(base),
        }
    }
}

impl Identities for SequentialIdentities {
    fn kind(&self) -> IdKind {
        self.kind
    }

    fn next(&self, _parent: RdId) -> RdId {
        RdId::new(self.counter.fetch_add(2, Ordering::Relaxed))
    }

    fn mix(&self, parent: RdId, tail: &str) -> RdId {
        RdId::new(STABLE_MASK | parent.mix(tail).hash())
    }

    fn mix_i64(&self, parent: RdId, tail: i64) -> RdId {
        RdId::new(STABLE_MASK | parent.mix_i64(tail).hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_ranges_are_disjoint() {
        let client = SequentialIdentities::new(IdKind::Client);
        let server = SequentialIdentities::new(IdKind::Server);

        let client_ids: Vec<i64> = (0..3).map(|_| client.next(RdId::NULL).hash()).collect();
        let server_ids: Vec<i64> = (0..3).map(|_| server.next(RdId::NULL).hash()).collect();

        assert_eq!(client_ids, vec![1_000_000, 1_000_002, 1_000_004]);
        assert_eq!(server_ids, vec![1_000_001, 1_000_003, 1_000_005]);
    }

    #[test]
    fn next_ignores_parent() {
        let client = SequentialIdentities::new(IdKind::Client);
        let first = client.next(RdId::new(7));
        let second = client.next(RdId::new(99));
        assert_eq!(second.hash() - first.hash(), 2);
    }

    #[test]
    fn stable_ids_agree_across_kinds_and_carry_top_bit() {
        let client = SequentialIdentities::new(IdKind::Client);
        let server = SequentialIdentities::new(IdKind::Server);
        let root = RdId::new(5);

        assert_eq!(client.mix(root, "field"), server.mix(root, "field"));
        assert!(client.mix(root, "field").hash() < 0);
    }
}
