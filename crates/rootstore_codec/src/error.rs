//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A map contains the same key twice.
    #[error("duplicate map key")]
    DuplicateKey,

    /// Float values are forbidden in canonical CBOR.
    #[error("float values are forbidden in canonical CBOR")]
    FloatForbidden,

    /// Indefinite-length items are forbidden.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLengthForbidden,

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Input continues after the first complete item.
    #[error("{count} trailing bytes after value")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        count: usize,
    },

    /// Invalid or non-canonical CBOR structure.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// Integer does not fit in an `i64`.
    #[error("integer overflow")]
    IntegerOverflow,

    /// A length prefix claims more than the decoder accepts.
    #[error("size limit exceeded: claimed {claimed}, max {max_allowed}")]
    SizeLimitExceeded {
        /// Claimed size from the input.
        claimed: u64,
        /// Maximum size accepted.
        max_allowed: u64,
    },
}

impl CodecError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
