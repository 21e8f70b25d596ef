//! # rootstore core
//!
//! A transactional, persistent object store.
//!
//! This crate provides:
//! - Sessions ([`SessionView`]) with nested persistent and transient scopes
//! - Durable roots, constants and a class table with dispatch
//! - An append-only commit log shared by any number of processes
//! - Cycle-safe graph traversal ([`RecursionGuard`]) for serialization and
//!   inspection
//!
//! ```
//! use rootstore_core::{PersistentStore, ScopeMode, Value};
//!
//! let store = PersistentStore::open_in_memory().unwrap();
//! let mut session = store.session().unwrap();
//!
//! let scope = session.enter(ScopeMode::Persistent);
//! session.write("hat", "A New Hat").unwrap();
//! session.commit_transaction().unwrap();
//! session.close(scope).unwrap();
//!
//! assert_eq!(store.session().unwrap().read("hat"), Some(Value::from("A New Hat")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod class;
mod config;
mod dir;
mod error;
pub mod graph;
mod guard;
mod inspect;
mod manifest;
mod object;
pub mod scope;
mod session;
pub mod snapshot;
mod store;
pub mod system;
mod types;
mod view;
pub mod wal;

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use class::{ClassEntry, ClassTable, MethodBody, MethodKind};
pub use config::Config;
pub use dir::{CommitLock, StoreDir};
pub use error::{CoreError, CoreResult};
pub use guard::{Identity, ObjectIdentity, RecursionGuard};
pub use inspect::{inspect, write_value};
pub use manifest::{Manifest, MANIFEST_MAGIC};
pub use object::{ObjectBody, ObjectRef, Value, LIST_CLASS};
pub use scope::{ScopeHandle, ScopeId, ScopeMode, ScopeStatus};
pub use session::SessionView;
pub use snapshot::{CatchUp, CommitSummary, Snapshot};
pub use store::PersistentStore;
pub use types::{ObjectId, SequenceNumber, SessionId, StoreKey, Symbol, TransactionId};
pub use view::WorkingView;
