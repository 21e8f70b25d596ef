//! The per-session stack of open scopes.

use crate::error::{CoreError, CoreResult};
use crate::object::{ObjectRef, Value};
use crate::scope::mutation::{Mutation, PendingWrite, Slot};
use crate::scope::state::{ScopeId, ScopeMode, ScopeStatus, TransactionScope};
use crate::types::SessionId;
use crate::view::WorkingView;
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Proof that a scope was entered; consumed when it is closed.
#[must_use = "an entered scope must be closed"]
#[derive(Debug)]
pub struct ScopeHandle {
    id: ScopeId,
    mode: ScopeMode,
}

impl ScopeHandle {
    /// The scope this handle closes.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// The scope's mode.
    #[must_use]
    pub fn mode(&self) -> ScopeMode {
        self.mode
    }
}

/// Outcome of closing a scope.
#[derive(Debug)]
pub struct ClosedScope {
    /// Final status.
    pub status: ScopeStatus,
    /// Writes the caller must roll back.
    pub discarded: Vec<PendingWrite>,
}

/// Nested scopes of one session, innermost last.
///
/// The stack also tracks which write last touched each slot. Undo and redo
/// only act on a slot whose last writer is the expected one, so writes of
/// different scopes to the same slot can be taken back in any order.
///
/// Pushes are tracked per list instead: the live pushes of a list, in
/// recording order, own the elements at its tail.
#[derive(Debug)]
pub struct ScopeStack {
    session: SessionId,
    scopes: Vec<TransactionScope>,
    writers: HashMap<Slot, u64>,
    pushes: HashMap<ObjectRef, Vec<u64>>,
    next_scope: u64,
    next_seq: u64,
}

impl ScopeStack {
    /// Creates an empty stack for `session`.
    #[must_use]
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            scopes: Vec::new(),
            writers: HashMap::new(),
            pushes: HashMap::new(),
            next_scope: 1,
            next_seq: 1,
        }
    }

    /// Opens a new innermost scope.
    pub fn enter(&mut self, mode: ScopeMode) -> ScopeHandle {
        let id = ScopeId(self.next_scope);
        self.next_scope += 1;
        self.scopes.push(TransactionScope::new(id, mode, self.session));
        debug!(scope = %id, ?mode, depth = self.scopes.len(), "scope entered");
        ScopeHandle { id, mode }
    }

    /// Number of scopes on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// True when no scope is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// The innermost scope.
    #[must_use]
    pub fn innermost(&self) -> Option<&TransactionScope> {
        self.scopes.last()
    }

    /// All scopes, outermost first.
    #[must_use]
    pub fn scopes(&self) -> &[TransactionScope] {
        &self.scopes
    }

    /// Looks up a scope by ID.
    #[must_use]
    pub fn get(&self, id: ScopeId) -> Option<&TransactionScope> {
        self.scopes.iter().find(|scope| scope.id() == id)
    }

    /// Fails unless the innermost scope accepts writes.
    pub(crate) fn check_writable(&self) -> CoreResult<()> {
        self.innermost()
            .ok_or(CoreError::NoActiveScope)?
            .ensure_open()
    }

    /// Records an already applied mutation in the innermost scope.
    pub(crate) fn record(&mut self, mutation: Mutation) -> CoreResult<u64> {
        let seq = self.next_seq;
        let pushed = mutation.pushed().map(|(list, _)| list.clone());
        let slot = mutation.slot().clone();
        let prev = match pushed {
            Some(_) => None,
            None => self.writers.get(&slot).copied(),
        };
        self.scopes
            .last_mut()
            .ok_or(CoreError::NoActiveScope)?
            .record(PendingWrite::new(seq, prev, mutation))?;
        match pushed {
            Some(list) => self.pushes.entry(list).or_default().push(seq),
            None => {
                self.writers.insert(slot, seq);
            }
        }
        self.next_seq += 1;
        Ok(seq)
    }

    /// Temporarily undoes `writes`, newest first. Writes overwritten since
    /// are left in place.
    pub(crate) fn hold_back(&mut self, writes: &[PendingWrite], view: &mut WorkingView) {
        let mut ordered: Vec<&PendingWrite> = writes.iter().collect();
        ordered.sort_by_key(|w| Reverse(w.seq()));
        for write in ordered {
            match self.undo(write, view) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(seq = write.seq(), slot = ?write.mutation().slot(), "undo skipped, slot written since");
                }
                Err(err) => {
                    warn!(seq = write.seq(), slot = ?write.mutation().slot(), error = %err, "undo failed");
                }
            }
        }
    }

    /// Re-applies writes taken back by [`hold_back`](Self::hold_back),
    /// oldest first.
    pub(crate) fn replay(&mut self, writes: &[PendingWrite], view: &mut WorkingView) {
        let mut ordered: Vec<&PendingWrite> = writes.iter().collect();
        ordered.sort_by_key(|w| w.seq());
        for write in ordered {
            match self.redo(write, view) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(seq = write.seq(), slot = ?write.mutation().slot(), "redo skipped, slot written since");
                }
                Err(err) => {
                    warn!(seq = write.seq(), slot = ?write.mutation().slot(), error = %err, "redo failed");
                }
            }
        }
    }

    /// Undoes `writes` for good, newest first.
    ///
    /// A discarded write that was overwritten by a surviving one cannot be
    /// undone; the survivor inherits its prior content instead.
    pub(crate) fn discard(&mut self, writes: &[PendingWrite], view: &mut WorkingView) {
        let mut ordered: Vec<&PendingWrite> = writes.iter().collect();
        ordered.sort_by_key(|w| Reverse(w.seq()));
        for write in ordered {
            match self.undo(write, view) {
                Ok(true) => {}
                Ok(false) => self.rebase_successor(write),
                Err(err) => {
                    warn!(seq = write.seq(), slot = ?write.mutation().slot(), error = %err, "discard failed");
                }
            }
        }
        if self.scopes.is_empty() {
            self.writers.clear();
            self.pushes.clear();
        }
    }

    /// Forgets the pushes among `writes`, which are now committed state.
    pub(crate) fn settle(&mut self, writes: &[PendingWrite]) {
        for write in writes {
            if let Some((list, _)) = write.mutation().pushed() {
                if let Some(live) = self.pushes.get_mut(list) {
                    live.retain(|seq| *seq != write.seq());
                    if live.is_empty() {
                        self.pushes.remove(list);
                    }
                }
            }
        }
    }

    /// `Ok(false)` if a later write has taken the slot over.
    fn undo(&mut self, write: &PendingWrite, view: &mut WorkingView) -> CoreResult<bool> {
        if let Some((list, _)) = write.mutation().pushed() {
            self.unpush(write.seq(), list)?;
            return Ok(true);
        }
        let slot = write.mutation().slot();
        if self.writers.get(slot) != Some(&write.seq()) {
            return Ok(false);
        }
        write.mutation().undo(view)?;
        match write.prev() {
            Some(prev) => self.writers.insert(slot.clone(), prev),
            None => self.writers.remove(slot),
        };
        Ok(true)
    }

    /// `Ok(false)` if the slot no longer holds what this write replaced.
    fn redo(&mut self, write: &PendingWrite, view: &mut WorkingView) -> CoreResult<bool> {
        if let Some((list, value)) = write.mutation().pushed() {
            self.repush(write.seq(), list, value)?;
            return Ok(true);
        }
        let slot = write.mutation().slot();
        if self.writers.get(slot).copied() != write.prev() {
            return Ok(false);
        }
        write.mutation().redo(view)?;
        self.writers.insert(slot.clone(), write.seq());
        Ok(true)
    }

    fn unpush(&mut self, seq: u64, list: &ObjectRef) -> CoreResult<()> {
        let live = self.pushes.get_mut(list).ok_or_else(|| stray_push(seq, list))?;
        let position = live
            .iter()
            .position(|s| *s == seq)
            .ok_or_else(|| stray_push(seq, list))?;
        let index = tail_start(list, live.len())? + position;
        list.remove_element(index).ok_or_else(|| stray_push(seq, list))?;
        live.remove(position);
        if live.is_empty() {
            self.pushes.remove(list);
        }
        Ok(())
    }

    fn repush(&mut self, seq: u64, list: &ObjectRef, value: &Value) -> CoreResult<()> {
        let live = self.pushes.entry(list.clone()).or_default();
        let position = live.partition_point(|s| *s < seq);
        if live.get(position) == Some(&seq) {
            return Err(stray_push(seq, list));
        }
        let index = tail_start(list, live.len())? + position;
        if !list.insert_element(index, value.clone()) {
            return Err(stray_push(seq, list));
        }
        live.insert(position, seq);
        Ok(())
    }

    fn rebase_successor(&mut self, write: &PendingWrite) {
        let slot = write.mutation().slot();
        let successor = self
            .scopes
            .iter_mut()
            .flat_map(|scope| scope.pending_mut().iter_mut())
            .find(|pending| pending.prev() == Some(write.seq()) && pending.mutation().slot() == slot);
        if let Some(successor) = successor {
            successor.rebase(write.prev(), write.mutation().before().cloned());
        }
    }

    /// Marks the scope aborted and returns the writes to roll back.
    pub(crate) fn abort(&mut self, handle: &ScopeHandle) -> CoreResult<Vec<PendingWrite>> {
        let scope = self
            .scopes
            .iter_mut()
            .find(|scope| scope.id() == handle.id)
            .ok_or(CoreError::ScopeNotOpen)?;
        scope.ensure_open()?;
        scope.mark_aborted();
        let pending = scope.take_pending();
        debug!(scope = %handle.id, discarded = pending.len(), "scope aborted");
        Ok(pending)
    }

    /// Pops the innermost scope, which must be `handle`'s.
    pub(crate) fn close(&mut self, handle: ScopeHandle) -> CoreResult<ClosedScope> {
        match self.scopes.last() {
            Some(top) if top.id() == handle.id => {}
            _ if self.get(handle.id).is_some() => {
                return Err(CoreError::invalid_operation(format!(
                    "{} closed while inner scopes are still open",
                    handle.id
                )));
            }
            _ => return Err(CoreError::ScopeNotOpen),
        }
        let mut scope = self.scopes.pop().ok_or(CoreError::ScopeNotOpen)?;

        let mut discarded = Vec::new();
        if scope.is_open() {
            let pending = scope.take_pending();
            match scope.mode() {
                ScopeMode::Transient => {
                    scope.mark_aborted();
                    discarded = pending;
                }
                ScopeMode::Persistent if pending.is_empty() => scope.mark_committed(),
                ScopeMode::Persistent => match self.nearest_persistent_mut() {
                    Some(parent) if parent.is_open() => {
                        debug!(
                            scope = %handle.id,
                            into = %parent.id(),
                            writes = pending.len(),
                            "uncommitted writes handed to enclosing scope"
                        );
                        parent.adopt(pending);
                        scope.mark_committed();
                    }
                    _ => {
                        scope.mark_aborted();
                        discarded = pending;
                    }
                },
            }
        }

        debug!(scope = %handle.id, status = ?scope.status(), depth = self.scopes.len(), "scope closed");
        Ok(ClosedScope {
            status: scope.status(),
            discarded,
        })
    }

    /// Index of the scope a commit publishes.
    pub(crate) fn commit_target(&self) -> CoreResult<usize> {
        let index = self
            .scopes
            .iter()
            .rposition(|scope| scope.mode() == ScopeMode::Persistent)
            .ok_or(CoreError::NoActiveTransaction)?;
        self.scopes[index].ensure_open()?;
        Ok(index)
    }

    pub(crate) fn scope_at_mut(&mut self, index: usize) -> Option<&mut TransactionScope> {
        self.scopes.get_mut(index)
    }

    /// Pending writes of every scope except `index`, in recording order.
    pub(crate) fn writes_outside(&self, index: usize) -> Vec<PendingWrite> {
        let mut writes: Vec<PendingWrite> = self
            .scopes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .flat_map(|(_, scope)| scope.pending().iter().cloned())
            .collect();
        writes.sort_by_key(PendingWrite::seq);
        writes
    }

    /// Pops every scope above `id` as aborted and returns their writes.
    pub(crate) fn unwind_above(&mut self, id: ScopeId) -> Vec<PendingWrite> {
        let Some(position) = self.scopes.iter().position(|scope| scope.id() == id) else {
            return Vec::new();
        };
        let mut discarded = Vec::new();
        for mut scope in self.scopes.drain(position + 1..) {
            scope.mark_aborted();
            discarded.extend(scope.take_pending());
        }
        discarded.sort_by_key(PendingWrite::seq);
        discarded
    }

    fn nearest_persistent_mut(&mut self) -> Option<&mut TransactionScope> {
        self.scopes
            .iter_mut()
            .rev()
            .find(|scope| scope.mode() == ScopeMode::Persistent)
    }
}

/// Index of the first element owned by a list's `live` pushes.
fn tail_start(list: &ObjectRef, live: usize) -> CoreResult<usize> {
    list.len().checked_sub(live).ok_or_else(|| {
        CoreError::invalid_operation(format!("{list:?} is shorter than its pending pushes"))
    })
}

fn stray_push(seq: u64, list: &ObjectRef) -> CoreError {
    CoreError::invalid_operation(format!("push {seq} onto {list:?} is out of step"))
}
