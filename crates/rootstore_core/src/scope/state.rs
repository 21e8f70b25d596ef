//! Scope state.

use crate::error::{CoreError, CoreResult};
use crate::scope::mutation::PendingWrite;
use crate::types::SessionId;
use std::fmt;

/// Identifier of a scope within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub u64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope:{}", self.0)
    }
}

/// Whether a scope's writes may become durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// Writes become durable on commit.
    Persistent,
    /// Writes are never durable.
    Transient,
}

/// Lifecycle state of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeStatus {
    /// Accepting writes.
    Open,
    /// Closed with its writes committed or handed to an enclosing scope.
    Committed,
    /// Writes rolled back.
    Aborted,
}

/// One open unit of work.
#[derive(Debug)]
pub struct TransactionScope {
    id: ScopeId,
    mode: ScopeMode,
    status: ScopeStatus,
    opened_by: SessionId,
    pending: Vec<PendingWrite>,
}

impl TransactionScope {
    pub(crate) fn new(id: ScopeId, mode: ScopeMode, opened_by: SessionId) -> Self {
        Self {
            id,
            mode,
            status: ScopeStatus::Open,
            opened_by,
            pending: Vec::new(),
        }
    }

    /// Returns the scope ID.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Returns the mode.
    #[must_use]
    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> ScopeStatus {
        self.status
    }

    /// The session that opened the scope.
    #[must_use]
    pub fn opened_by(&self) -> SessionId {
        self.opened_by
    }

    /// Checks if the scope still accepts writes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == ScopeStatus::Open
    }

    /// Writes recorded and not yet committed, in recording order.
    #[must_use]
    pub fn pending(&self) -> &[PendingWrite] {
        &self.pending
    }

    pub(crate) fn pending_mut(&mut self) -> &mut [PendingWrite] {
        &mut self.pending
    }

    pub(crate) fn record(&mut self, write: PendingWrite) -> CoreResult<()> {
        self.ensure_open()?;
        self.pending.push(write);
        Ok(())
    }

    /// Adopts writes handed down from a closed inner scope.
    pub(crate) fn adopt(&mut self, writes: Vec<PendingWrite>) {
        self.pending.extend(writes);
        self.pending.sort_by_key(PendingWrite::seq);
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PendingWrite> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn mark_committed(&mut self) {
        self.status = ScopeStatus::Committed;
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.status = ScopeStatus::Aborted;
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::ScopeNotOpen)
        }
    }
}
