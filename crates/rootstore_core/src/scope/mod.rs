//! Transaction scopes.
//!
//! Every write a session makes is recorded as a [`Mutation`] in the
//! innermost open [`TransactionScope`] and applied to the session's working
//! view at once. A scope is either *persistent* (its writes may be
//! committed) or *transient* (its writes are rolled back when it closes).
//!
//! Scopes nest and form a [`ScopeStack`]. Each recorded write carries a
//! session-wide sequence number, so the writes of all open scopes can be
//! undone and redone in a well-defined order:
//!
//! ```text
//! persistent P   [w1 w2]          <- nearest persistent scope: commit target
//!   transient T  [w3]             <- undone while P's state is serialized
//! ```
//!
//! The stack remembers the last writer of every slot. A write is undone only
//! while it is still the last writer, and redone only while the write it
//! replaced is, so equal values written by different scopes never mix.

mod mutation;
mod stack;
mod state;

pub use mutation::{Mutation, PendingWrite, Slot, SlotValue, Target};
pub use stack::{ClosedScope, ScopeHandle, ScopeStack};
pub use state::{ScopeId, ScopeMode, ScopeStatus, TransactionScope};
