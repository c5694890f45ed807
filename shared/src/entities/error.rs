use thiserror::Error;

use crate::{identity::{IdentityError, RdId}, scheduler::SchedulerError, wire::WireError};

/// Errors raised while identifying, binding or mutating a synchronized entity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// `bind` was called before `identify`
    #[error("Entity `{name}` has no id, identify it before binding")]
    NotIdentified { name: String },

    /// `identify` was called on an entity that already has an id
    #[error("Entity already identified with id {id}")]
    AlreadyIdentified { id: RdId },

    /// An entity was identified with the null id
    #[error("Entity can't be identified with the null id")]
    NullId,

    /// `bind` was called on an entity that is already bound
    #[error("Entity `{location}` is already bound")]
    AlreadyBound { location: String },

    /// The parent passed to `bind` is not attached to any protocol
    #[error("Parent `{parent}` of `{name}` is not bound to a protocol")]
    ParentNotBound { parent: String, name: String },

    /// The lifetime passed to `bind` has already ended
    #[error("Can't bind `{name}` under a terminated lifetime")]
    LifetimeTerminated { name: String },

    /// An operation needs a bound entity
    #[error("Entity `{location}` is not bound")]
    NotBound { location: String },

    /// A bound entity was touched outside its protocol's scheduler
    #[error("{0}")]
    WrongThread(#[from] SchedulerError),

    /// The wire refused the subscription
    #[error("Wire subscription failed: {0}")]
    Wire(#[from] WireError),

    /// The requested static id is outside the static range
    #[error("{0}")]
    Identity(#[from] IdentityError),
}
