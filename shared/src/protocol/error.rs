use thiserror::Error;

use rd_serde::SerdeErr;

/// Errors raised by the polymorphic serializer registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Two different types hash to the same polymorphic type id
    #[error("Can't register `{new}` with id {id}, already registered: `{existing}`")]
    DuplicateTypeId {
        id: i64,
        existing: String,
        new: String,
    },

    /// A polymorphic value carried a type id nobody registered
    #[error("No reader registered for type id {0}")]
    UnknownTypeId(i64),

    /// Tried to write a value whose type was never registered
    #[error("Type `{0}` is not registered for polymorphic serialization")]
    UnregisteredType(&'static str),

    /// A polymorphic value decoded to a different type than requested
    #[error("Polymorphic value is `{actual}`, expected `{expected}`")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },

    /// The underlying bytes could not be decoded
    #[error("Serialization failed: {0}")]
    Serde(#[from] SerdeErr),
}
