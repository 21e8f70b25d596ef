//! Cycle-safe traversal of object graphs.
//!
//! A [`RecursionGuard`] remembers which objects the current traversal is
//! inside of. Serialization and inspection consult it before descending so
//! that a cyclic graph is walked once instead of forever.
//!
//! ```
//! use rootstore_core::{ObjectRef, RecursionGuard};
//!
//! let list = ObjectRef::list(Vec::new());
//! let mut guard = RecursionGuard::new();
//! let nested = guard.visit(&list, |g| g.is_being_visited(&list));
//! assert!(nested);
//! assert!(!guard.is_being_visited(&list));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

/// Identity of a heap object: its allocation address.
///
/// Two structurally equal objects have different identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectIdentity(usize);

impl ObjectIdentity {
    /// Identity of the allocation behind an `Arc`.
    pub fn of_arc<T: ?Sized>(arc: &Arc<T>) -> Self {
        Self(Arc::as_ptr(arc).cast::<()>() as usize)
    }
}

/// Anything that can be tracked by a [`RecursionGuard`].
pub trait Identity {
    /// Returns the object's identity.
    fn identity(&self) -> ObjectIdentity;
}

impl Identity for ObjectIdentity {
    fn identity(&self) -> ObjectIdentity {
        *self
    }
}

impl<T: ?Sized> Identity for Arc<T> {
    fn identity(&self) -> ObjectIdentity {
        ObjectIdentity::of_arc(self)
    }
}

/// Multiset of identities currently being visited by one traversal.
#[derive(Debug, Default)]
pub struct RecursionGuard {
    active: HashMap<ObjectIdentity, usize>,
    depth: usize,
    entries: u64,
}

impl RecursionGuard {
    /// Creates an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff `obj` is on the stack.
    pub fn is_being_visited<T: Identity + ?Sized>(&self, obj: &T) -> bool {
        self.active.contains_key(&obj.identity())
    }

    /// Runs `body` with `obj` on the stack.
    ///
    /// The identity is popped when `body` returns, whatever it returns, and
    /// also if it unwinds. Visiting an object that is already on the stack
    /// nests.
    pub fn visit<T, R, F>(&mut self, obj: &T, body: F) -> R
    where
        T: Identity + ?Sized,
        F: FnOnce(&mut Self) -> R,
    {
        let identity = obj.identity();
        *self.active.entry(identity).or_insert(0) += 1;
        self.depth += 1;
        self.entries += 1;

        let mut frame = Frame {
            guard: self,
            identity,
        };
        body(&mut *frame.guard)
    }

    /// Number of visits currently in progress.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True when no visit is in progress.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    /// Total number of visits started over the guard's lifetime.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.entries
    }

    fn pop(&mut self, identity: ObjectIdentity) {
        if let Some(count) = self.active.get_mut(&identity) {
            *count -= 1;
            if *count == 0 {
                self.active.remove(&identity);
            }
        }
        self.depth -= 1;
    }
}

/// Pops its identity on drop.
struct Frame<'a> {
    guard: &'a mut RecursionGuard,
    identity: ObjectIdentity,
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        self.guard.pop(self.identity);
    }
}
