//! # rootstore testkit
//!
//! Test utilities for rootstore.
//!
//! This crate provides:
//! - Test fixtures: temporary stores, reopening as a "new process",
//!   log damage helpers
//! - Property-based test generators using proptest
//! - Multi-session stress helpers
//!
//! ## Usage
//!
//! ```rust
//! use rootstore_core::Value;
//! use rootstore_testkit::prelude::*;
//!
//! let store = TestStore::file();
//! let mut writer = store.session();
//! writer
//!     .enter_persistent(|s| {
//!         s.write("hat", "A New Hat")?;
//!         s.commit_transaction()
//!     })
//!     .unwrap();
//!
//! let checker = store.reopen().session();
//! assert_eq!(checker.read("hat"), Some(Value::from("A New Hat")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
