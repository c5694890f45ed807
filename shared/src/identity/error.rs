use thiserror::Error;

/// Errors that can occur while assigning identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// A static id must lie strictly between zero and the static range bound
    #[error("Static id {id} is outside (0, {max})")]
    StaticIdOutOfRange { id: i64, max: i64 },

    /// An operation required a non-null id
    #[error("Id is null")]
    NullId,
}
