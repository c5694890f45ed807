use std::time::Duration;

use thiserror::Error;

use crate::{entities::BindError, protocol::ProtocolError};

use super::task::RdFault;

/// Errors surfaced to the caller of an RPC
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The call is not bound or was used on the wrong thread
    #[error("{0}")]
    Bind(#[from] BindError),

    /// The request could not be serialized
    #[error("Failed to serialize request: {0}")]
    Serialization(#[from] ProtocolError),

    /// The call was cancelled before a response arrived
    #[error("Call was cancelled")]
    Cancelled,

    /// The remote handler failed
    #[error("Remote handler failed: {0}")]
    Fault(RdFault),

    /// A blocking call waited longer than its error timeout
    #[error("Call `{location}` timed out after {waited:?}")]
    Timeout { location: String, waited: Duration },
}
