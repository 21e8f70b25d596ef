//! Commit log.
//!
//! Every commit is appended to the log as one contiguous run of records:
//!
//! ```text
//! Begin{txid, session} Put/Delete{txid, key, payload}* Commit{txid, seq}
//! ```
//!
//! ## Record format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! ## Recovery policy
//!
//! - A record cut short at the end of the log (crash or concurrent append in
//!   progress) ends the scan; the scan reports the tail as torn
//! - A CRC mismatch, bad magic, unknown type or future version is fatal
//! - Only transactions whose `Commit` record is complete are ever applied
//! - Transactions left without `Commit` or `Abort` by a crashed writer are
//!   closed with an `Abort` record by the next writer

mod record;
mod writer;

pub use record::{compute_crc32, WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
pub use writer::{WalManager, WalScan};
