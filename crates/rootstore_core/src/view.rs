//! A session's working view of the store.
//!
//! The view is the latest synchronized committed state with every recorded
//! mutation of every open scope applied on top. Mutations address the view
//! through [`Slot`]s so they can be undone and redone.

use crate::class::{ClassEntry, ClassTable, MethodBody, MethodKind};
use crate::error::{CoreError, CoreResult};
use crate::object::{ObjectRef, Value};
use crate::scope::{Mutation, Slot, SlotValue};
use crate::types::Symbol;
use std::collections::BTreeMap;

/// Roots, classes and constants as one session sees them.
#[derive(Debug, Clone, Default)]
pub struct WorkingView {
    pub(crate) roots: BTreeMap<Symbol, Value>,
    pub(crate) classes: ClassTable,
    pub(crate) constants: BTreeMap<String, Value>,
}

impl WorkingView {
    /// Reads a root.
    #[must_use]
    pub fn root(&self, key: &Symbol) -> Option<&Value> {
        self.roots.get(key)
    }

    /// Root keys in sorted order.
    pub fn root_keys(&self) -> impl Iterator<Item = &Symbol> {
        self.roots.keys()
    }

    /// The class table.
    #[must_use]
    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    /// Reads a constant.
    #[must_use]
    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    /// Constant names in sorted order.
    pub fn constant_names(&self) -> impl Iterator<Item = &str> {
        self.constants.keys().map(String::as_str)
    }

    /// Writes `after` into `slot` and returns the mutation that did it.
    pub(crate) fn apply(&mut self, slot: Slot, after: Option<SlotValue>) -> CoreResult<Mutation> {
        let before = self.read_slot(&slot);
        self.write_slot(&slot, after.clone())?;
        Ok(Mutation::new(slot, before, after))
    }

    pub(crate) fn read_slot(&self, slot: &Slot) -> Option<SlotValue> {
        match slot {
            Slot::Root(key) => self.roots.get(key).cloned().map(SlotValue::Value),
            Slot::Constant(name) => self.constants.get(name).cloned().map(SlotValue::Value),
            Slot::Field(obj, name) => obj.field(name).map(SlotValue::Value),
            Slot::Push(_) => None,
            Slot::Class(name) => self.classes.get(name).cloned().map(SlotValue::Class),
            Slot::Method(class, kind, selector) => self
                .classes
                .get(class)
                .and_then(|entry| entry.method(*kind, selector))
                .cloned()
                .map(SlotValue::Method),
            Slot::ClassVar(class, name) => self
                .classes
                .get(class)
                .and_then(|entry| entry.class_var(name))
                .cloned()
                .map(SlotValue::Value),
            Slot::ClassInstanceVar(class, name) => self
                .classes
                .get(class)
                .and_then(|entry| entry.class_instance_var(name))
                .cloned()
                .map(SlotValue::Value),
        }
    }

    pub(crate) fn write_slot(&mut self, slot: &Slot, value: Option<SlotValue>) -> CoreResult<()> {
        match slot {
            Slot::Root(key) => {
                put(&mut self.roots, key.clone(), as_value(value)?);
            }
            Slot::Constant(name) => {
                put(&mut self.constants, name.clone(), as_value(value)?);
            }
            Slot::Field(obj, name) => {
                obj.put_field(name, as_value(value)?)?;
            }
            Slot::Push(list) => {
                let appended = match as_value(value)? {
                    Some(value) => list.insert_element(list.len(), value),
                    None => false,
                };
                if !appended {
                    return Err(CoreError::invalid_operation(format!(
                        "cannot push onto {list:?}"
                    )));
                }
            }
            Slot::Class(name) => {
                self.classes.put(name, as_class(value)?);
            }
            Slot::Method(class, kind, selector) => {
                let body = as_method(value)?;
                put(
                    self.class_mut(class)?.methods_mut(*kind),
                    selector.clone(),
                    body,
                );
            }
            Slot::ClassVar(class, name) => {
                let value = as_value(value)?;
                put(self.class_mut(class)?.class_vars_mut(), name.clone(), value);
            }
            Slot::ClassInstanceVar(class, name) => {
                let value = as_value(value)?;
                put(
                    self.class_mut(class)?.class_instance_vars_mut(),
                    name.clone(),
                    value,
                );
            }
        }
        Ok(())
    }

    fn class_mut(&mut self, name: &str) -> CoreResult<&mut ClassEntry> {
        self.classes
            .get_mut(name)
            .ok_or_else(|| CoreError::undefined_target(format!("class {name}")))
    }
}

fn put<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, value: Option<V>) {
    match value {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

fn as_value(value: Option<SlotValue>) -> CoreResult<Option<Value>> {
    match value {
        None => Ok(None),
        Some(SlotValue::Value(value)) => Ok(Some(value)),
        Some(other) => Err(slot_mismatch("value", &other)),
    }
}

fn as_class(value: Option<SlotValue>) -> CoreResult<Option<ClassEntry>> {
    match value {
        None => Ok(None),
        Some(SlotValue::Class(entry)) => Ok(Some(entry)),
        Some(other) => Err(slot_mismatch("class entry", &other)),
    }
}

fn as_method(value: Option<SlotValue>) -> CoreResult<Option<MethodBody>> {
    match value {
        None => Ok(None),
        Some(SlotValue::Method(body)) => Ok(Some(body)),
        Some(other) => Err(slot_mismatch("method body", &other)),
    }
}

fn slot_mismatch(expected: &str, found: &SlotValue) -> CoreError {
    CoreError::invalid_operation(format!("slot expects a {expected}, got {found:?}"))
}

/// Method slot address for `class`.
pub(crate) fn method_slot(class: &str, kind: MethodKind, selector: &str) -> Slot {
    Slot::Method(class.to_string(), kind, selector.to_string())
}

/// Field slot address for `obj`.
pub(crate) fn field_slot(obj: &ObjectRef, name: &str) -> Slot {
    Slot::Field(obj.clone(), name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(v: impl Into<Value>) -> Option<SlotValue> {
        Some(SlotValue::Value(v.into()))
    }

    #[test]
    fn apply_records_previous_state() {
        let mut view = WorkingView::default();
        let slot = Slot::Root(Symbol::from("hat"));

        let first = view.apply(slot.clone(), value("Old Hat")).unwrap();
        assert_eq!(first.before(), None);

        let second = view.apply(slot, value("A New Hat")).unwrap();
        assert_eq!(second.before(), value("Old Hat").as_ref());
        assert_eq!(view.root(&Symbol::from("hat")), Some(&Value::from("A New Hat")));
    }

    #[test]
    fn method_slots_need_their_class() {
        let mut view = WorkingView::default();
        let slot = method_slot("Foo", MethodKind::Instance, "bar");

        let err = view
            .apply(slot.clone(), Some(SlotValue::Method(MethodBody::Constant(Value::Nil))))
            .unwrap_err();
        assert!(matches!(err, CoreError::UndefinedTarget { .. }));

        view.apply(Slot::Class("Foo".into()), Some(SlotValue::Class(ClassEntry::new("Foo"))))
            .unwrap();
        view.apply(slot.clone(), Some(SlotValue::Method(MethodBody::Constant(Value::Nil))))
            .unwrap();
        assert!(view.read_slot(&slot).is_some());
    }

    #[test]
    fn slot_kind_mismatch_is_rejected() {
        let mut view = WorkingView::default();
        let err = view
            .apply(
                Slot::Root(Symbol::from("x")),
                Some(SlotValue::Class(ClassEntry::new("Foo"))),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn field_and_element_slots_touch_objects() {
        let mut view = WorkingView::default();
        let obj = ObjectRef::new("Employee");
        let list = ObjectRef::list(vec![]);

        view.apply(field_slot(&obj, "name"), value("Ada")).unwrap();
        view.apply(Slot::Push(list.clone()), value(&obj)).unwrap();

        assert_eq!(obj.field("name"), Some(Value::from("Ada")));
        assert_eq!(list.get(0), Some(Value::from(&obj)));
    }
}
