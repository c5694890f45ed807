use std::time::Duration;

use crate::{identity::IdKind, wire::DEFAULT_MAX_BUFFERED_PER_ID};

/// How long a blocking RPC call waits before complaining and before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcTimeouts {
    /// Calls slower than this are logged at warn level
    pub warn_await: Duration,
    /// Calls slower than this fail with a timeout
    pub error_await: Duration,
}

impl RpcTimeouts {
    pub const fn new(warn_await: Duration, error_await: Duration) -> Self {
        Self {
            warn_await,
            error_await,
        }
    }

    pub const fn long_running() -> Self {
        Self::new(Duration::from_millis(10_000), Duration::from_millis(15_000))
    }

    pub const fn infinite() -> Self {
        Self::new(Duration::MAX, Duration::MAX)
    }
}

impl Default for RpcTimeouts {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_millis(3_000))
    }
}

/// Settings for one protocol endpoint.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub name: String,
    /// Which half of the dynamic id space this endpoint allocates from
    pub id_kind: IdKind,
    pub rpc_timeouts: RpcTimeouts,
    /// Messages held per not-yet-bound id before the oldest are dropped
    pub max_buffered_messages_per_id: usize,
}

impl ProtocolConfig {
    pub fn new(name: impl Into<String>, id_kind: IdKind) -> Self {
        Self {
            name: name.into(),
            id_kind,
            ..Self::default()
        }
    }

    pub fn with_rpc_timeouts(mut self, rpc_timeouts: RpcTimeouts) -> Self {
        self.rpc_timeouts = rpc_timeouts;
        self
    }

    pub fn with_max_buffered_messages_per_id(mut self, max: usize) -> Self {
        self.max_buffered_messages_per_id = max;
        self
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            name: "protocol".to_string(),
            id_kind: IdKind::Client,
            rpc_timeouts: RpcTimeouts::default(),
            max_buffered_messages_per_id: DEFAULT_MAX_BUFFERED_PER_ID,
        }
    }
}
