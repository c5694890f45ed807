use thiserror::Error;

use rd_serde::SerdeErr;

use crate::identity::RdId;

/// Errors raised while routing wire messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Messages and subscriptions must carry a non-null id
    #[error("Wire id must not be null")]
    NullId,

    /// A second subscriber tried to bind an id that is already bound
    #[error("Id {id} already has a subscriber `{existing}`")]
    DuplicateSubscription { id: RdId, existing: String },

    /// An inbound frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] SerdeErr),
}
