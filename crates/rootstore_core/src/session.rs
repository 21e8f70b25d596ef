//! One session's connection to a store.
//!
//! A [`SessionView`] reads from its working view: the committed state as of
//! its last synchronization, with every open scope's changes applied on
//! top. All changes go through a scope:
//!
//! ```
//! use rootstore_core::{PersistentStore, Value};
//!
//! let store = PersistentStore::open_in_memory().unwrap();
//! let mut writer = store.session().unwrap();
//! writer
//!     .enter_persistent(|s| {
//!         s.write("hat", "A New Hat")?;
//!         s.commit_transaction()
//!     })
//!     .unwrap();
//!
//! let checker = store.session().unwrap();
//! assert_eq!(checker.read("hat"), Some(Value::from("A New Hat")));
//! ```

use crate::class::{ClassEntry, MethodBody, MethodKind};
use crate::error::{CoreError, CoreResult};
use crate::graph::{GraphDecoder, GraphEncoder};
use crate::guard::RecursionGuard;
use crate::inspect::inspect;
use crate::object::{ObjectRef, Value};
use crate::scope::{
    PendingWrite, ScopeHandle, ScopeMode, ScopeStack, ScopeStatus, Slot, SlotValue, Target,
};
use crate::snapshot::Snapshot;
use crate::store::{PersistentStore, PublishRequest};
use crate::system::SessionStats;
use crate::types::{ObjectId, SequenceNumber, SessionId, StoreKey, Symbol};
use crate::view::{field_slot, method_slot, WorkingView};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// A session on a [`PersistentStore`].
///
/// Sessions never share state directly; they see each other's work only
/// through commits.
pub struct SessionView {
    id: SessionId,
    store: Arc<PersistentStore>,
    snapshot: Snapshot,
    view: WorkingView,
    identity: HashMap<ObjectId, ObjectRef>,
    scopes: ScopeStack,
    base: SequenceNumber,
    stats: SessionStats,
}

impl SessionView {
    pub(crate) fn open(store: Arc<PersistentStore>) -> CoreResult<Self> {
        let id = SessionId::generate();
        let mut snapshot = Snapshot::new();
        store.catch_up(&mut snapshot)?;

        let mut identity = HashMap::new();
        let view = GraphDecoder::new(&snapshot, &mut identity).materialize()?;
        let base = snapshot.sequence();
        snapshot.prune_history(base);
        debug!(session = %id, sequence = %base, "session opened");

        Ok(Self {
            id,
            stats: SessionStats::new(store.config().stat_slots),
            store,
            snapshot,
            view,
            identity,
            scopes: ScopeStack::new(id),
            base,
        })
    }

    /// This session's ID.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The store this session belongs to.
    #[must_use]
    pub fn store(&self) -> &Arc<PersistentStore> {
        &self.store
    }

    /// Sequence number the working view was last synchronized to.
    #[must_use]
    pub fn synced_sequence(&self) -> SequenceNumber {
        self.base
    }

    /// The working view.
    #[must_use]
    pub fn view(&self) -> &WorkingView {
        &self.view
    }

    /// The open scopes.
    #[must_use]
    pub fn scopes(&self) -> &ScopeStack {
        &self.scopes
    }

    /// This session's statistics registry.
    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Pulls the latest committed state into the working view.
    ///
    /// Objects the session already knows keep their handles; their state is
    /// replaced with the committed state.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` while any scope is open.
    pub fn refresh(&mut self) -> CoreResult<()> {
        if !self.scopes.is_empty() {
            return Err(CoreError::invalid_operation(
                "cannot refresh while scopes are open",
            ));
        }
        self.store.catch_up(&mut self.snapshot)?;
        self.view = GraphDecoder::new(&self.snapshot, &mut self.identity).materialize()?;
        self.base = self.snapshot.sequence();
        self.snapshot.prune_history(self.base);
        debug!(session = %self.id, sequence = %self.base, "session refreshed");
        Ok(())
    }

    // Roots

    /// Reads a root. `None` if the key is not defined.
    #[must_use]
    pub fn read(&self, key: impl Into<Symbol>) -> Option<Value> {
        self.view.root(&key.into()).cloned()
    }

    /// Defined root keys, sorted.
    #[must_use]
    pub fn roots(&self) -> Vec<Symbol> {
        self.view.root_keys().cloned().collect()
    }

    /// Writes a root in the innermost scope.
    pub fn write(&mut self, key: impl Into<Symbol>, value: impl Into<Value>) -> CoreResult<()> {
        self.mutate(Slot::Root(key.into()), Some(SlotValue::Value(value.into())))?;
        Ok(())
    }

    /// Removes a root and returns what it held.
    pub fn remove(&mut self, key: impl Into<Symbol>) -> CoreResult<Option<Value>> {
        let before = self.mutate(Slot::Root(key.into()), None)?;
        Ok(match before {
            Some(SlotValue::Value(value)) => Some(value),
            _ => None,
        })
    }

    // Constants

    /// Reads a constant.
    #[must_use]
    pub fn constant(&self, name: &str) -> Option<Value> {
        self.view.constant(name).cloned()
    }

    /// Sets a constant in the innermost scope.
    pub fn set_constant(&mut self, name: impl Into<String>, value: impl Into<Value>) -> CoreResult<()> {
        self.mutate(Slot::Constant(name.into()), Some(SlotValue::Value(value.into())))?;
        Ok(())
    }

    // Classes

    /// Looks up a class in the working view.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassEntry> {
        self.view.classes().get(name)
    }

    /// Defines a class, or reopens it and merges `entry` into it.
    pub fn define_class(&mut self, entry: ClassEntry) -> CoreResult<()> {
        let name = entry.name().to_string();
        let merged = match self.view.classes().get(&name) {
            Some(existing) => {
                let mut merged = existing.clone();
                merged.merge(&entry);
                merged
            }
            None => entry,
        };
        self.mutate(Slot::Class(name), Some(SlotValue::Class(merged)))?;
        Ok(())
    }

    /// Removes a whole class.
    pub fn remove_class(&mut self, name: &str) -> CoreResult<()> {
        self.existing_class(name)?;
        self.mutate(Slot::Class(name.to_string()), None)?;
        Ok(())
    }

    /// Adds or replaces one method of an existing class.
    pub fn define_method(
        &mut self,
        class: &str,
        selector: &str,
        kind: MethodKind,
        body: MethodBody,
    ) -> CoreResult<()> {
        self.existing_class(class)?;
        self.mutate(method_slot(class, kind, selector), Some(SlotValue::Method(body)))?;
        Ok(())
    }

    /// Removes one method.
    ///
    /// # Errors
    ///
    /// `UndefinedTarget` if the class or the method does not exist.
    pub fn remove_method(&mut self, class: &str, selector: &str, kind: MethodKind) -> CoreResult<()> {
        if self.existing_class(class)?.method(kind, selector).is_none() {
            let separator = match kind {
                MethodKind::Instance => '#',
                MethodKind::Class => '.',
            };
            return Err(CoreError::undefined_target(format!(
                "method {class}{separator}{selector}"
            )));
        }
        self.mutate(method_slot(class, kind, selector), None)?;
        Ok(())
    }

    /// Removes an instance method.
    pub fn remove_instance_method(&mut self, class: &str, selector: &str) -> CoreResult<()> {
        self.remove_method(class, selector, MethodKind::Instance)
    }

    /// Removes a class method.
    pub fn remove_class_method(&mut self, class: &str, selector: &str) -> CoreResult<()> {
        self.remove_method(class, selector, MethodKind::Class)
    }

    /// Reads a class variable.
    #[must_use]
    pub fn class_var(&self, class: &str, name: &str) -> Option<Value> {
        self.class(class)?.class_var(name).cloned()
    }

    /// Sets a class variable of an existing class.
    pub fn set_class_var(&mut self, class: &str, name: &str, value: impl Into<Value>) -> CoreResult<()> {
        self.existing_class(class)?;
        let slot = Slot::ClassVar(class.to_string(), name.to_string());
        self.mutate(slot, Some(SlotValue::Value(value.into())))?;
        Ok(())
    }

    /// Reads a class-instance variable.
    #[must_use]
    pub fn class_instance_var(&self, class: &str, name: &str) -> Option<Value> {
        self.class(class)?.class_instance_var(name).cloned()
    }

    /// Sets a class-instance variable of an existing class.
    pub fn set_class_instance_var(
        &mut self,
        class: &str,
        name: &str,
        value: impl Into<Value>,
    ) -> CoreResult<()> {
        self.existing_class(class)?;
        let slot = Slot::ClassInstanceVar(class.to_string(), name.to_string());
        self.mutate(slot, Some(SlotValue::Value(value.into())))?;
        Ok(())
    }

    // Objects

    /// Sets a field of `obj`.
    pub fn set_field(&mut self, obj: &ObjectRef, name: &str, value: impl Into<Value>) -> CoreResult<()> {
        if obj.is_list() {
            return Err(CoreError::invalid_operation(format!(
                "cannot set field @{name} on a list"
            )));
        }
        self.mutate(field_slot(obj, name), Some(SlotValue::Value(value.into())))?;
        Ok(())
    }

    /// Appends to a list object.
    pub fn push(&mut self, list: &ObjectRef, value: impl Into<Value>) -> CoreResult<()> {
        if !list.is_list() {
            return Err(CoreError::invalid_operation(format!(
                "cannot push onto {list:?}"
            )));
        }
        self.mutate(Slot::Push(list.clone()), Some(SlotValue::Value(value.into())))?;
        Ok(())
    }

    // Scopes

    /// Opens a scope. The handle must be given back to [`close`](Self::close).
    pub fn enter(&mut self, mode: ScopeMode) -> ScopeHandle {
        self.scopes.enter(mode)
    }

    /// Closes the innermost scope.
    ///
    /// Writes that cannot survive the close are rolled back.
    pub fn close(&mut self, handle: ScopeHandle) -> CoreResult<ScopeStatus> {
        let mode = handle.mode();
        let id = handle.id();
        let closed = self.scopes.close(handle)?;
        if mode == ScopeMode::Persistent && !closed.discarded.is_empty() {
            warn!(
                session = %self.id,
                scope = %id,
                writes = closed.discarded.len(),
                "uncommitted writes discarded"
            );
        }
        self.scopes.discard(&closed.discarded, &mut self.view);
        Ok(closed.status)
    }

    /// Aborts a scope and rolls back its writes. The scope stays on the
    /// stack until closed.
    ///
    /// # Errors
    ///
    /// `ScopeNotOpen` if the scope was already aborted or closed.
    pub fn abort(&mut self, handle: &ScopeHandle) -> CoreResult<()> {
        let discarded = self.scopes.abort(handle)?;
        self.scopes.discard(&discarded, &mut self.view);
        Ok(())
    }

    /// Runs `body` in a persistent scope.
    ///
    /// The scope is closed however `body` ends; if it fails the scope is
    /// aborted first and the error is returned unchanged.
    pub fn enter_persistent<T, F>(&mut self, body: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Self) -> CoreResult<T>,
    {
        self.run_scoped(ScopeMode::Persistent, body)
    }

    /// Runs `body` in a transient scope. Nothing it writes outlives it.
    pub fn enter_transient<T, F>(&mut self, body: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Self) -> CoreResult<T>,
    {
        self.run_scoped(ScopeMode::Transient, body)
    }

    fn run_scoped<T, F>(&mut self, mode: ScopeMode, body: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Self) -> CoreResult<T>,
    {
        let handle = self.enter(mode);
        let id = handle.id();
        let depth = self.scopes.depth();
        let result = body(self);

        if self.scopes.depth() > depth {
            warn!(scope = %id, leaked = self.scopes.depth() - depth, "closing scopes left open");
            let leaked = self.scopes.unwind_above(id);
            self.scopes.discard(&leaked, &mut self.view);
        }

        match result {
            Ok(value) => {
                self.close(handle)?;
                Ok(value)
            }
            Err(err) => {
                if self.scopes.get(id).is_some_and(|scope| scope.is_open()) {
                    if let Err(abort) = self.abort(&handle) {
                        warn!(scope = %id, error = %abort, "abort after failure");
                    }
                }
                if let Err(close) = self.close(handle) {
                    warn!(scope = %id, error = %close, "close after failure");
                }
                Err(err)
            }
        }
    }

    /// Publishes the nearest persistent scope's pending writes.
    ///
    /// Returns the commit's sequence number, or `None` if there was nothing
    /// to publish. Writes of other scopes are held back for the duration
    /// of the commit and stay pending.
    ///
    /// # Errors
    ///
    /// `NoActiveTransaction` without a persistent scope, `ScopeNotOpen` if
    /// it was aborted, `CommitConflict` if another session committed to a
    /// touched target since this session's last refresh. A failed commit
    /// leaves the scope aborted and the store unchanged.
    pub fn commit_transaction(&mut self) -> CoreResult<Option<SequenceNumber>> {
        let index = self.scopes.commit_target()?;
        let committing: Vec<PendingWrite> = self
            .scopes
            .scopes()
            .get(index)
            .map(|scope| scope.pending().to_vec())
            .unwrap_or_default();
        if committing.is_empty() {
            return Ok(None);
        }

        let others = self.scopes.writes_outside(index);
        self.scopes.hold_back(&others, &mut self.view);

        let targets = touched_targets(&committing);
        let keys: BTreeSet<StoreKey> = targets.iter().filter_map(conflict_key).collect();
        let request = PublishRequest {
            session: self.id,
            base: self.base,
            keys: &keys,
        };

        let mut encoder = None;
        let view = &self.view;
        let result = self.store.publish(request, &mut self.snapshot, |next_oid| {
            let encoder = encoder.insert(GraphEncoder::new(next_oid));
            encoder.encode_targets(&targets, view, &mut RecursionGuard::new())
        });

        match result {
            Ok(sequence) => {
                if let Some(encoder) = &encoder {
                    for obj in encoder.assigned() {
                        if let Some(oid) = obj.oid() {
                            self.identity.insert(oid, obj.clone());
                        }
                    }
                }
                if let Some(scope) = self.scopes.scope_at_mut(index) {
                    scope.take_pending();
                }
                self.scopes.settle(&committing);
                self.scopes.replay(&others, &mut self.view);
                Ok(Some(sequence))
            }
            Err(err) => {
                if let Some(encoder) = &mut encoder {
                    encoder.rollback();
                }
                if let Some(scope) = self.scopes.scope_at_mut(index) {
                    scope.mark_aborted();
                    scope.take_pending();
                }
                self.scopes.replay(&others, &mut self.view);
                self.scopes.discard(&committing, &mut self.view);
                warn!(session = %self.id, error = %err, "commit failed, scope aborted");
                Err(err)
            }
        }
    }

    // Dispatch

    /// Sends `selector` to `receiver` using its class's instance methods.
    ///
    /// # Errors
    ///
    /// `NoMethod` if the receiver's class does not define the selector.
    pub fn send(&self, receiver: &Value, selector: &str) -> CoreResult<Value> {
        let class_name = receiver.class_name();
        let class = self.view.classes().get(&class_name);
        match class.and_then(|c| c.method(MethodKind::Instance, selector).map(|m| (c, m))) {
            Some((class, body)) => Ok(body.evaluate(receiver.as_object(), class)),
            None => Err(CoreError::no_method(selector, describe_receiver(receiver))),
        }
    }

    /// Sends `selector` to a class using its class methods.
    ///
    /// # Errors
    ///
    /// `UndefinedTarget` if the class does not exist, `NoMethod` if it does
    /// not define the selector.
    pub fn send_class(&self, class: &str, selector: &str) -> CoreResult<Value> {
        let entry = self.existing_class(class)?;
        entry
            .method(MethodKind::Class, selector)
            .map(|body| body.evaluate(None, entry))
            .ok_or_else(|| CoreError::no_method(selector, format!("{class}:Class")))
    }

    /// True if `receiver` responds to `selector`.
    #[must_use]
    pub fn responds_to(&self, receiver: &Value, selector: &str) -> bool {
        self.class(&receiver.class_name())
            .is_some_and(|c| c.method(MethodKind::Instance, selector).is_some())
    }

    /// True if `class` has a class method `selector`.
    #[must_use]
    pub fn class_responds_to(&self, class: &str, selector: &str) -> bool {
        self.class(class)
            .is_some_and(|c| c.method(MethodKind::Class, selector).is_some())
    }

    /// Renders a value; cycles are cut short.
    #[must_use]
    pub fn inspect(&self, value: &Value) -> String {
        inspect(value)
    }

    fn existing_class(&self, name: &str) -> CoreResult<&ClassEntry> {
        self.view
            .classes()
            .get(name)
            .ok_or_else(|| CoreError::undefined_target(format!("class {name}")))
    }

    /// Applies a change and records it in the innermost scope.
    fn mutate(&mut self, slot: Slot, after: Option<SlotValue>) -> CoreResult<Option<SlotValue>> {
        self.scopes.check_writable()?;
        let mutation = self.view.apply(slot, after)?;
        let before = mutation.before().cloned();
        self.scopes.record(mutation)?;
        Ok(before)
    }
}

impl std::fmt::Debug for SessionView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionView")
            .field("id", &self.id)
            .field("synced", &self.base)
            .field("scopes", &self.scopes.depth())
            .finish_non_exhaustive()
    }
}

/// Distinct targets of `writes`, in first-touched order.
fn touched_targets(writes: &[PendingWrite]) -> Vec<Target> {
    let mut seen = HashSet::new();
    writes
        .iter()
        .map(|w| w.mutation().slot().target())
        .filter(|target| seen.insert(target.clone()))
        .collect()
}

/// The durable key two sessions would contend on. New objects have none.
fn conflict_key(target: &Target) -> Option<StoreKey> {
    match target {
        Target::Root(key) => Some(StoreKey::Root(key.clone())),
        Target::Class(name) => Some(StoreKey::Class(name.clone())),
        Target::Constant(name) => Some(StoreKey::Constant(name.clone())),
        Target::Object(obj) => obj.oid().map(StoreKey::Object),
    }
}

fn describe_receiver(receiver: &Value) -> String {
    match receiver {
        Value::Object(obj) => format!("#<{}>", obj.class_name()),
        scalar => format!("{}:{}", inspect(scalar), scalar.class_name()),
    }
}
