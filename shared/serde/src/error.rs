use thiserror::Error;

/// Errors produced while decoding a byte stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerdeErr {
    /// The stream ended before the value was complete
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    /// A length or count prefix was negative
    #[error("negative length prefix {0}")]
    NegativeLength(i32),

    /// A string payload was not valid UTF-8
    #[error("string payload is not valid utf-8")]
    InvalidUtf8,

    /// A tag byte did not name any known variant
    #[error("invalid tag {tag} for {type_name}")]
    InvalidTag { type_name: &'static str, tag: i64 },

    /// A whole-buffer decode left bytes unread
    #[error("{remaining} trailing bytes after value")]
    TrailingBytes { remaining: usize },
}
