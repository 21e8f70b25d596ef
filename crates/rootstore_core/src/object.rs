//! Object model: values and identity-bearing object handles.
//!
//! A [`Value`] is either a scalar or a reference to an object. Objects are
//! shared through [`ObjectRef`] handles; equality of handles is identity,
//! so graphs may share nodes and contain cycles.
//!
//! Objects are read freely, but only the session mutates them, and only
//! inside a scope, so every change is recorded and can be rolled back.

use crate::error::{CoreError, CoreResult};
use crate::guard::{Identity, ObjectIdentity};
use crate::types::{ObjectId, Symbol};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Class name given to list objects.
pub const LIST_CLASS: &str = "Array";

/// A persisted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// The absent/nil value.
    Nil,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// UTF-8 string.
    Text(String),
    /// Symbol such as `:hat`.
    Symbol(Symbol),
    /// Reference to an object; compares by identity.
    Object(ObjectRef),
}

impl Value {
    /// Name of the value's class, used for dispatch.
    #[must_use]
    pub fn class_name(&self) -> String {
        match self {
            Self::Nil => "NilClass".to_string(),
            Self::Bool(true) => "TrueClass".to_string(),
            Self::Bool(false) => "FalseClass".to_string(),
            Self::Integer(_) => "Integer".to_string(),
            Self::Text(_) => "String".to_string(),
            Self::Symbol(_) => "Symbol".to_string(),
            Self::Object(obj) => obj.class_name(),
        }
    }

    /// Check if this value is nil.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a symbol, if it is one.
    #[must_use]
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Get the referenced object, if this is an object reference.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Self::Symbol(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}

impl From<&ObjectRef> for Value {
    fn from(obj: &ObjectRef) -> Self {
        Self::Object(obj.clone())
    }
}

/// Contents of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBody {
    /// Named instance variables.
    Fields(BTreeMap<String, Value>),
    /// Ordered elements.
    List(Vec<Value>),
}

#[derive(Debug)]
struct ObjectData {
    class_name: String,
    body: ObjectBody,
    oid: Option<ObjectId>,
}

/// Shared handle to one object.
///
/// Cloning the handle does not copy the object.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<ObjectData>>);

impl ObjectRef {
    /// Creates an object of `class_name` with no fields.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self::from_body(class_name, ObjectBody::Fields(BTreeMap::new()))
    }

    /// Creates an object with initial fields.
    pub fn with_fields<I, K>(class_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::from_body(class_name, ObjectBody::Fields(fields))
    }

    /// Creates a list object.
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self::from_body(LIST_CLASS, ObjectBody::List(items))
    }

    pub(crate) fn from_body(class_name: impl Into<String>, body: ObjectBody) -> Self {
        Self(Arc::new(RwLock::new(ObjectData {
            class_name: class_name.into(),
            body,
            oid: None,
        })))
    }

    /// Returns the class name.
    #[must_use]
    pub fn class_name(&self) -> String {
        self.0.read().class_name.clone()
    }

    /// Returns the durable id, if the object has been committed.
    #[must_use]
    pub fn oid(&self) -> Option<ObjectId> {
        self.0.read().oid
    }

    /// True if both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// True for list objects.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self.0.read().body, ObjectBody::List(_))
    }

    /// Reads a named field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        match &self.0.read().body {
            ObjectBody::Fields(fields) => fields.get(name).cloned(),
            ObjectBody::List(_) => None,
        }
    }

    /// Returns all named fields, sorted by name.
    #[must_use]
    pub fn fields(&self) -> Vec<(String, Value)> {
        match &self.0.read().body {
            ObjectBody::Fields(fields) => {
                fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            ObjectBody::List(_) => Vec::new(),
        }
    }

    /// Reads a list element.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        match &self.0.read().body {
            ObjectBody::List(items) => items.get(index).cloned(),
            ObjectBody::Fields(_) => None,
        }
    }

    /// Returns the list elements, or `None` for field objects.
    #[must_use]
    pub fn elements(&self) -> Option<Vec<Value>> {
        match &self.0.read().body {
            ObjectBody::List(items) => Some(items.clone()),
            ObjectBody::Fields(_) => None,
        }
    }

    /// Number of elements or fields.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.0.read().body {
            ObjectBody::List(items) => items.len(),
            ObjectBody::Fields(fields) => fields.len(),
        }
    }

    /// True when the object has no elements or fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn body(&self) -> ObjectBody {
        self.0.read().body.clone()
    }

    /// Sets (or with `None` removes) a field; returns the previous value.
    pub(crate) fn put_field(&self, name: &str, value: Option<Value>) -> CoreResult<Option<Value>> {
        let mut data = self.0.write();
        let class_name = data.class_name.clone();
        match &mut data.body {
            ObjectBody::Fields(fields) => Ok(match value {
                Some(value) => fields.insert(name.to_string(), value),
                None => fields.remove(name),
            }),
            ObjectBody::List(_) => Err(CoreError::invalid_operation(format!(
                "cannot set field @{name} on list object of class {class_name}"
            ))),
        }
    }

    /// Inserts a list element at `index`, shifting later elements up.
    /// `false` for field objects or an index past the end.
    pub(crate) fn insert_element(&self, index: usize, value: Value) -> bool {
        let mut data = self.0.write();
        match &mut data.body {
            ObjectBody::List(items) if index <= items.len() => {
                items.insert(index, value);
                true
            }
            _ => false,
        }
    }

    /// Removes the list element at `index`, shifting later elements down.
    pub(crate) fn remove_element(&self, index: usize) -> Option<Value> {
        let mut data = self.0.write();
        match &mut data.body {
            ObjectBody::List(items) if index < items.len() => Some(items.remove(index)),
            _ => None,
        }
    }

    pub(crate) fn set_oid(&self, oid: Option<ObjectId>) {
        self.0.write().oid = oid;
    }

    /// Overwrites class and contents with committed state.
    pub(crate) fn replace_state(&self, class_name: String, body: ObjectBody) {
        let mut data = self.0.write();
        data.class_name = class_name;
        data.body = body;
    }
}

impl Identity for ObjectRef {
    fn identity(&self) -> ObjectIdentity {
        ObjectIdentity::of_arc(&self.0)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.read();
        match data.oid {
            Some(oid) => write!(f, "#<{} {oid}>", data.class_name),
            None => write!(f, "#<{}>", data.class_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_identity() {
        let a = ObjectRef::with_fields("Hat", [("size", Value::from(7))]);
        let b = ObjectRef::with_fields("Hat", [("size", Value::from(7))]);

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(Value::from(&a), Value::from(a.clone()));
        assert_ne!(Value::from(&a), Value::from(&b));
    }

    #[test]
    fn scalar_values_compare_by_value() {
        assert_eq!(Value::from("hat"), Value::from("hat"));
        assert_eq!(Value::from(3), Value::Integer(3));
        assert_ne!(Value::from("hat"), Value::Symbol(Symbol::from("hat")));
    }

    #[test]
    fn class_names() {
        assert_eq!(Value::Nil.class_name(), "NilClass");
        assert_eq!(Value::from(1).class_name(), "Integer");
        assert_eq!(Value::from("x").class_name(), "String");
        assert_eq!(ObjectRef::list(vec![]).class_name(), LIST_CLASS);
        assert_eq!(Value::from(ObjectRef::new("Foo")).class_name(), "Foo");
    }

    #[test]
    fn field_access() {
        let obj = ObjectRef::new("Employee");
        assert_eq!(obj.put_field("name", Some(Value::from("Ada"))).unwrap(), None);
        assert_eq!(
            obj.put_field("name", Some(Value::from("Grace"))).unwrap(),
            Some(Value::from("Ada"))
        );
        assert_eq!(obj.field("name"), Some(Value::from("Grace")));
        assert_eq!(obj.put_field("name", None).unwrap(), Some(Value::from("Grace")));
        assert!(obj.is_empty());
    }

    #[test]
    fn fields_rejected_on_lists() {
        let list = ObjectRef::list(vec![]);
        assert!(matches!(
            list.put_field("x", Some(Value::Nil)),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn elements_shift_on_insert_and_remove() {
        let list = ObjectRef::list(vec![Value::from(1)]);

        assert!(list.insert_element(1, Value::from(3)));
        assert!(!list.insert_element(5, Value::from(9)));
        assert!(list.insert_element(1, Value::from(2)));
        assert_eq!(
            list.elements().unwrap(),
            vec![Value::from(1), Value::from(2), Value::from(3)]
        );

        assert_eq!(list.remove_element(0), Some(Value::from(1)));
        assert_eq!(list.remove_element(2), None);
        assert_eq!(list.elements().unwrap(), vec![Value::from(2), Value::from(3)]);
        assert!(!ObjectRef::new("Hat").insert_element(0, Value::Nil));
    }

    #[test]
    fn self_reference_is_allowed() {
        let list = ObjectRef::list(vec![]);
        assert!(list.insert_element(0, Value::from(&list)));
        assert_eq!(list.get(0), Some(Value::from(&list)));
    }

    #[test]
    fn debug_does_not_recurse() {
        let list = ObjectRef::list(vec![]);
        list.insert_element(0, Value::from(&list));
        assert_eq!(format!("{list:?}"), "#<Array>");
        list.set_oid(Some(ObjectId::new(4)));
        assert_eq!(format!("{list:?}"), "#<Array oid:4>");
    }
}
