//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store.
///
/// # Invariants
///
/// - `append` returns the offset where data was written and writes all of it
///   in one call, so a concurrent reader either sees none of it or a prefix
///   it can recognise as torn
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `size` reflects bytes appended through *any* handle on the same store
/// - `flush` hands data to the OS, `sync` makes it survive power loss
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends
    /// beyond the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage and returns its offset.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes appended data to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs data and metadata to durable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Cuts the storage back to `new_size` bytes.
    ///
    /// Used to drop a torn or failed commit from the end of the log.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateBeyondEnd`] if `new_size` is
    /// larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
