use thiserror::Error;

/// Errors that can occur on reactive sources and collections
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// The same handler instance was advised twice on one source
    #[error("Handler is already advised on `{source_name}`")]
    DuplicateHandler { source_name: String },

    /// A list position was outside the list
    #[error("Index {index} is out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A write-once property was set a second time
    #[error("Write-once property `{name}` already has a value")]
    AlreadySet { name: String },
}
