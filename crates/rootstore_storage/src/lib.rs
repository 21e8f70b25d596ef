//! # rootstore storage
//!
//! Byte-store backends underneath the rootstore commit log.
//!
//! Backends are **opaque byte stores**: they append, read, flush and truncate
//! bytes and know nothing about log records. The commit log owns every format
//! decision.
//!
//! Several sessions may look at the same bytes at once (separate processes on
//! one file, or several handles on one in-memory buffer), so `size` always
//! reports what is currently stored rather than what this handle wrote.
//!
//! ## Example
//!
//! ```rust
//! use rootstore_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
