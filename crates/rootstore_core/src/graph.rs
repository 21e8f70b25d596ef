//! Serialization of object graphs to and from durable records.
//!
//! Values map onto canonical CBOR as follows:
//!
//! | Value | CBOR |
//! |---|---|
//! | `Nil`, `Bool`, `Integer`, `Text` | native |
//! | `Symbol` | tag 39 around the name |
//! | `Object` | tag 29 around the object id |
//!
//! An object record is a map `{"class": name, "fields": {..}}` or
//! `{"class": name, "items": [..]}`. Objects are stored once, by id, so
//! shared references and cycles survive the round trip.

use crate::class::{ClassEntry, MethodBody, MethodKind};
use crate::error::{CoreError, CoreResult};
use crate::guard::{Identity, ObjectIdentity, RecursionGuard};
use crate::object::{ObjectBody, ObjectRef, Value};
use crate::scope::Target;
use crate::snapshot::Snapshot;
use crate::types::{ObjectId, StoreKey, Symbol};
use crate::view::WorkingView;
use rootstore_codec::Value as Cbor;
use std::collections::{BTreeMap, HashMap, HashSet};

/// CBOR tag marking a symbol.
pub const SYMBOL_TAG: u64 = 39;

/// CBOR tag marking a reference to a stored object.
pub const OBJECT_REF_TAG: u64 = 29;

/// One entry of a commit: the new durable state of a key, `None` to delete.
pub type DurableWrite = (StoreKey, Option<Cbor>);

/// Serializes the final state of touched targets.
///
/// Objects that have never been committed get fresh ids as they are
/// reached; [`GraphEncoder::rollback`] takes those ids back if the commit
/// fails.
#[derive(Debug, Default)]
pub struct GraphEncoder {
    next_oid: u64,
    assigned: Vec<ObjectRef>,
    emitted: HashSet<ObjectIdentity>,
    writes: Vec<DurableWrite>,
}

impl GraphEncoder {
    /// Creates an encoder that assigns ids starting at `next_oid`.
    #[must_use]
    pub fn new(next_oid: ObjectId) -> Self {
        Self {
            next_oid: next_oid.as_u64(),
            ..Self::default()
        }
    }

    /// Encodes every target, reading state from `view`.
    pub fn encode_targets<'t>(
        &mut self,
        targets: impl IntoIterator<Item = &'t Target>,
        view: &WorkingView,
        guard: &mut RecursionGuard,
    ) -> CoreResult<Vec<DurableWrite>> {
        for target in targets {
            self.encode_target(target, view, guard)?;
        }
        Ok(std::mem::take(&mut self.writes))
    }

    /// Encodes one target.
    pub fn encode_target(
        &mut self,
        target: &Target,
        view: &WorkingView,
        guard: &mut RecursionGuard,
    ) -> CoreResult<()> {
        match target {
            Target::Root(key) => {
                let state = match view.root(key) {
                    Some(value) => Some(self.encode_value(value, guard)?),
                    None => None,
                };
                self.writes.push((StoreKey::Root(key.clone()), state));
            }
            Target::Constant(name) => {
                let state = match view.constant(name) {
                    Some(value) => Some(self.encode_value(value, guard)?),
                    None => None,
                };
                self.writes.push((StoreKey::Constant(name.clone()), state));
            }
            Target::Class(name) => {
                let state = match view.classes().get(name) {
                    Some(entry) => Some(self.encode_class(entry, guard)?),
                    None => None,
                };
                self.writes.push((StoreKey::Class(name.clone()), state));
            }
            Target::Object(obj) => {
                self.oid_for(obj);
                self.emit_object(obj, guard)?;
            }
        }
        Ok(())
    }

    /// Encodes a value; objects reached for the first time are emitted too.
    pub fn encode_value(&mut self, value: &Value, guard: &mut RecursionGuard) -> CoreResult<Cbor> {
        Ok(match value {
            Value::Nil => Cbor::Null,
            Value::Bool(b) => Cbor::Bool(*b),
            Value::Integer(n) => Cbor::Integer(*n),
            Value::Text(s) => Cbor::Text(s.clone()),
            Value::Symbol(s) => Cbor::tag(SYMBOL_TAG, Cbor::Text(s.as_str().to_string())),
            Value::Object(obj) => {
                let (oid, fresh) = self.oid_for(obj);
                if fresh {
                    self.emit_object(obj, guard)?;
                }
                object_ref(oid)?
            }
        })
    }

    /// Encodes a class entry.
    pub fn encode_class(&mut self, entry: &ClassEntry, guard: &mut RecursionGuard) -> CoreResult<Cbor> {
        let instance_methods = self.encode_methods(entry.methods(MethodKind::Instance), guard)?;
        let class_methods = self.encode_methods(entry.methods(MethodKind::Class), guard)?;
        let class_vars = self.encode_map(entry.class_vars(), guard)?;
        let class_instance_vars = self.encode_map(entry.class_instance_vars(), guard)?;

        Ok(Cbor::map(vec![
            (Cbor::from("name"), Cbor::from(entry.name())),
            (Cbor::from("instance_methods"), instance_methods),
            (Cbor::from("class_methods"), class_methods),
            (Cbor::from("class_vars"), class_vars),
            (Cbor::from("class_instance_vars"), class_instance_vars),
        ]))
    }

    /// Takes back the ids this encoder assigned.
    pub fn rollback(&mut self) {
        for obj in self.assigned.drain(..) {
            obj.set_oid(None);
        }
        self.emitted.clear();
        self.writes.clear();
    }

    /// Objects that received their first id from this encoder.
    #[must_use]
    pub fn assigned(&self) -> &[ObjectRef] {
        &self.assigned
    }

    fn oid_for(&mut self, obj: &ObjectRef) -> (ObjectId, bool) {
        if let Some(oid) = obj.oid() {
            return (oid, false);
        }
        let oid = ObjectId::new(self.next_oid);
        self.next_oid += 1;
        obj.set_oid(Some(oid));
        self.assigned.push(obj.clone());
        (oid, true)
    }

    fn emit_object(&mut self, obj: &ObjectRef, guard: &mut RecursionGuard) -> CoreResult<()> {
        if self.emitted.contains(&obj.identity()) || guard.is_being_visited(obj) {
            return Ok(());
        }
        let (oid, _) = self.oid_for(obj);

        let record = guard.visit(obj, |guard| self.encode_object(obj, guard))?;
        self.emitted.insert(obj.identity());
        self.writes.push((StoreKey::Object(oid), Some(record)));
        Ok(())
    }

    fn encode_object(&mut self, obj: &ObjectRef, guard: &mut RecursionGuard) -> CoreResult<Cbor> {
        let body = match obj.body() {
            ObjectBody::Fields(fields) => (Cbor::from("fields"), self.encode_map(&fields, guard)?),
            ObjectBody::List(items) => {
                let mut encoded = Vec::with_capacity(items.len());
                for item in &items {
                    encoded.push(self.encode_value(item, guard)?);
                }
                (Cbor::from("items"), Cbor::Array(encoded))
            }
        };
        Ok(Cbor::map(vec![(Cbor::from("class"), Cbor::from(obj.class_name())), body]))
    }

    fn encode_map(
        &mut self,
        map: &BTreeMap<String, Value>,
        guard: &mut RecursionGuard,
    ) -> CoreResult<Cbor> {
        let mut pairs = Vec::with_capacity(map.len());
        for (name, value) in map {
            pairs.push((Cbor::from(name.as_str()), self.encode_value(value, guard)?));
        }
        Ok(Cbor::map(pairs))
    }

    fn encode_methods(
        &mut self,
        methods: &BTreeMap<String, MethodBody>,
        guard: &mut RecursionGuard,
    ) -> CoreResult<Cbor> {
        let mut pairs = Vec::with_capacity(methods.len());
        for (selector, body) in methods {
            pairs.push((Cbor::from(selector.as_str()), self.encode_method(body, guard)?));
        }
        Ok(Cbor::map(pairs))
    }

    fn encode_method(&mut self, body: &MethodBody, guard: &mut RecursionGuard) -> CoreResult<Cbor> {
        let (kind, arg) = match body {
            MethodBody::Constant(value) => ("constant", self.encode_value(value, guard)?),
            MethodBody::Field(name) => ("field", Cbor::from(name.as_str())),
            MethodBody::ClassVar(name) => ("class_var", Cbor::from(name.as_str())),
            MethodBody::ClassInstanceVar(name) => ("class_instance_var", Cbor::from(name.as_str())),
        };
        Ok(Cbor::Array(vec![Cbor::from(kind), arg]))
    }
}

fn object_ref(oid: ObjectId) -> CoreResult<Cbor> {
    let raw = i64::try_from(oid.as_u64())
        .map_err(|_| CoreError::invalid_operation("object id space exhausted"))?;
    Ok(Cbor::tag(OBJECT_REF_TAG, Cbor::Integer(raw)))
}

/// Rebuilds live values from committed records.
///
/// Objects already present in the identity map keep their handle; their
/// state is overwritten with the committed state, once per decoder.
pub struct GraphDecoder<'a> {
    snapshot: &'a Snapshot,
    identity: &'a mut HashMap<ObjectId, ObjectRef>,
    refreshed: HashSet<ObjectId>,
}

impl<'a> GraphDecoder<'a> {
    /// Creates a decoder over `snapshot` sharing `identity`.
    pub fn new(snapshot: &'a Snapshot, identity: &'a mut HashMap<ObjectId, ObjectRef>) -> Self {
        Self {
            snapshot,
            identity,
            refreshed: HashSet::new(),
        }
    }

    /// Builds a full working view, then refreshes every other known object.
    pub fn materialize(mut self) -> CoreResult<WorkingView> {
        let mut view = WorkingView::default();
        let snapshot = self.snapshot;

        for (key, state) in snapshot.entries() {
            match key {
                StoreKey::Root(symbol) => {
                    view.roots.insert(symbol.clone(), self.decode_value(state)?);
                }
                StoreKey::Constant(name) => {
                    view.constants.insert(name.clone(), self.decode_value(state)?);
                }
                StoreKey::Class(name) => {
                    view.classes.put(name, Some(self.decode_class(state)?));
                }
                StoreKey::Object(_) => {}
            }
        }

        let known: Vec<ObjectId> = self.identity.keys().copied().collect();
        for oid in known {
            if snapshot.get(&StoreKey::Object(oid)).is_some() {
                self.resolve(oid)?;
            }
        }
        Ok(view)
    }

    /// Decodes a stored value.
    pub fn decode_value(&mut self, state: &Cbor) -> CoreResult<Value> {
        Ok(match state {
            Cbor::Null => Value::Nil,
            Cbor::Bool(b) => Value::Bool(*b),
            Cbor::Integer(n) => Value::Integer(*n),
            Cbor::Text(s) => Value::Text(s.clone()),
            Cbor::Tag(SYMBOL_TAG, inner) => {
                let name = inner
                    .as_text()
                    .ok_or_else(|| CoreError::invalid_format("symbol tag without text"))?;
                Value::Symbol(Symbol::new(name))
            }
            Cbor::Tag(OBJECT_REF_TAG, inner) => {
                let raw = inner
                    .as_integer()
                    .and_then(|n| u64::try_from(n).ok())
                    .ok_or_else(|| CoreError::invalid_format("object reference without id"))?;
                Value::Object(self.resolve(ObjectId::new(raw))?)
            }
            other => {
                return Err(CoreError::invalid_format(format!(
                    "unexpected stored value {other:?}"
                )))
            }
        })
    }

    /// Decodes a stored class entry.
    pub fn decode_class(&mut self, state: &Cbor) -> CoreResult<ClassEntry> {
        let name = state
            .get("name")
            .and_then(Cbor::as_text)
            .ok_or_else(|| CoreError::invalid_format("class record without name"))?;
        let mut entry = ClassEntry::new(name);

        for (field, kind) in [
            ("instance_methods", MethodKind::Instance),
            ("class_methods", MethodKind::Class),
        ] {
            for (selector, body) in text_map(state, field)? {
                let body = self.decode_method(body)?;
                entry = entry.with_method(kind, selector, body);
            }
        }
        for (var, value) in text_map(state, "class_vars")? {
            let value = self.decode_value(value)?;
            entry = entry.with_class_var(var, value);
        }
        for (var, value) in text_map(state, "class_instance_vars")? {
            let value = self.decode_value(value)?;
            entry = entry.with_class_instance_var(var, value);
        }
        Ok(entry)
    }

    fn decode_method(&mut self, state: &Cbor) -> CoreResult<MethodBody> {
        let Some([kind, arg]) = state.as_array() else {
            return Err(CoreError::invalid_format("malformed method body"));
        };
        let name = || {
            arg.as_text()
                .map(str::to_string)
                .ok_or_else(|| CoreError::invalid_format("method body without name"))
        };
        match kind.as_text() {
            Some("constant") => Ok(MethodBody::Constant(self.decode_value(arg)?)),
            Some("field") => Ok(MethodBody::Field(name()?)),
            Some("class_var") => Ok(MethodBody::ClassVar(name()?)),
            Some("class_instance_var") => Ok(MethodBody::ClassInstanceVar(name()?)),
            _ => Err(CoreError::invalid_format(format!(
                "unknown method body kind {kind:?}"
            ))),
        }
    }

    fn resolve(&mut self, oid: ObjectId) -> CoreResult<ObjectRef> {
        if self.refreshed.contains(&oid) {
            if let Some(obj) = self.identity.get(&oid) {
                return Ok(obj.clone());
            }
        }

        let snapshot = self.snapshot;
        let state = snapshot
            .get(&StoreKey::Object(oid))
            .ok_or_else(|| CoreError::invalid_format(format!("dangling reference to {oid}")))?;
        let class_name = state
            .get("class")
            .and_then(Cbor::as_text)
            .ok_or_else(|| CoreError::invalid_format(format!("{oid} has no class")))?
            .to_string();

        let obj = self
            .identity
            .entry(oid)
            .or_insert_with(|| ObjectRef::from_body(class_name.clone(), ObjectBody::List(Vec::new())))
            .clone();
        obj.set_oid(Some(oid));
        self.refreshed.insert(oid);

        let body = if let Some(items) = state.get("items").and_then(Cbor::as_array) {
            let mut decoded = Vec::with_capacity(items.len());
            for item in items {
                decoded.push(self.decode_value(item)?);
            }
            ObjectBody::List(decoded)
        } else {
            let mut fields = BTreeMap::new();
            for (name, value) in text_map(state, "fields")? {
                fields.insert(name.to_string(), self.decode_value(value)?);
            }
            ObjectBody::Fields(fields)
        };
        obj.replace_state(class_name, body);
        Ok(obj)
    }
}

/// Entries of a map-valued field whose keys are text. Missing means empty.
fn text_map<'v>(state: &'v Cbor, field: &str) -> CoreResult<Vec<(&'v str, &'v Cbor)>> {
    let Some(map) = state.get(field) else {
        return Ok(Vec::new());
    };
    let pairs = map
        .as_map()
        .ok_or_else(|| CoreError::invalid_format(format!("{field} is not a map")))?;
    pairs
        .iter()
        .map(|(k, v)| {
            k.as_text()
                .map(|k| (k, v))
                .ok_or_else(|| CoreError::invalid_format(format!("non-text key in {field}")))
        })
        .collect()
}
