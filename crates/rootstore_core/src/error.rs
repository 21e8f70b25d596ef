//! Error types for rootstore core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in rootstore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] rootstore_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] rootstore_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A write was issued with no scope open.
    #[error("no active scope")]
    NoActiveScope,

    /// Commit was requested with no persistent scope open.
    #[error("no active persistent transaction")]
    NoActiveTransaction,

    /// The scope has already been aborted or closed.
    #[error("scope is not open")]
    ScopeNotOpen,

    /// The named class, method, root or object does not exist.
    #[error("undefined target: {target}")]
    UndefinedTarget {
        /// Description of the missing target.
        target: String,
    },

    /// Another session committed to the same target first.
    #[error("commit conflict on {target}")]
    CommitConflict {
        /// The contested target.
        target: String,
    },

    /// The commit lock could not be acquired in time.
    #[error("store locked: commit lock not acquired within timeout")]
    StoreLocked,

    /// Dispatch found no method for the selector.
    #[error("undefined method `{selector}' for {receiver}")]
    NoMethod {
        /// The selector that was sent.
        selector: String,
        /// Rendered receiver (`#<Foo>` or `Foo:Class`).
        receiver: String,
    },

    /// Commit log is corrupted or invalid.
    #[error("WAL corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Invalid store format or version.
    #[error("invalid store format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// An argument was out of range or malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the bad argument.
        message: String,
    },
}

impl CoreError {
    /// Creates an undefined target error.
    pub fn undefined_target(target: impl Into<String>) -> Self {
        Self::UndefinedTarget {
            target: target.into(),
        }
    }

    /// Creates a commit conflict error.
    pub fn commit_conflict(target: impl Into<String>) -> Self {
        Self::CommitConflict {
            target: target.into(),
        }
    }

    /// Creates a no-method error.
    pub fn no_method(selector: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self::NoMethod {
            selector: selector.into(),
            receiver: receiver.into(),
        }
    }

    /// Creates a WAL corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
