//! Durable class definitions and method bodies.

use crate::object::{ObjectRef, Value};
use std::collections::BTreeMap;

/// Whether a method belongs to instances or to the class itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MethodKind {
    /// Instance method, dispatched on objects of the class.
    Instance,
    /// Class-level method, dispatched on the class.
    Class,
}

impl MethodKind {
    /// Short name used in durable records and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Class => "class",
        }
    }
}

/// A stored method body.
///
/// Bodies are data, not code: dispatch evaluates them against the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodBody {
    /// Always returns the value.
    Constant(Value),
    /// Returns the receiver's named field.
    Field(String),
    /// Returns a class variable of the defining class.
    ClassVar(String),
    /// Returns a class-instance variable of the defining class.
    ClassInstanceVar(String),
}

impl MethodBody {
    /// Evaluates the body. `receiver` is `None` for class-level dispatch.
    #[must_use]
    pub fn evaluate(&self, receiver: Option<&ObjectRef>, class: &ClassEntry) -> Value {
        let found = match self {
            Self::Constant(value) => Some(value.clone()),
            Self::Field(name) => receiver.and_then(|obj| obj.field(name)),
            Self::ClassVar(name) => class.class_var(name).cloned(),
            Self::ClassInstanceVar(name) => class.class_instance_var(name).cloned(),
        };
        found.unwrap_or(Value::Nil)
    }
}

/// One class table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    name: String,
    instance_methods: BTreeMap<String, MethodBody>,
    class_methods: BTreeMap<String, MethodBody>,
    class_vars: BTreeMap<String, Value>,
    class_instance_vars: BTreeMap<String, Value>,
}

impl ClassEntry {
    /// Creates an empty class.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_methods: BTreeMap::new(),
            class_methods: BTreeMap::new(),
            class_vars: BTreeMap::new(),
            class_instance_vars: BTreeMap::new(),
        }
    }

    /// Adds a method of the given kind.
    #[must_use]
    pub fn with_method(mut self, kind: MethodKind, selector: impl Into<String>, body: MethodBody) -> Self {
        self.methods_mut(kind).insert(selector.into(), body);
        self
    }

    /// Adds an instance method.
    #[must_use]
    pub fn with_instance_method(self, selector: impl Into<String>, body: MethodBody) -> Self {
        self.with_method(MethodKind::Instance, selector, body)
    }

    /// Adds a class method.
    #[must_use]
    pub fn with_class_method(self, selector: impl Into<String>, body: MethodBody) -> Self {
        self.with_method(MethodKind::Class, selector, body)
    }

    /// Sets a class variable.
    #[must_use]
    pub fn with_class_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.class_vars.insert(name.into(), value.into());
        self
    }

    /// Sets a class-instance variable.
    #[must_use]
    pub fn with_class_instance_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.class_instance_vars.insert(name.into(), value.into());
        self
    }

    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a method.
    #[must_use]
    pub fn method(&self, kind: MethodKind, selector: &str) -> Option<&MethodBody> {
        self.methods(kind).get(selector)
    }

    /// All methods of one kind.
    #[must_use]
    pub fn methods(&self, kind: MethodKind) -> &BTreeMap<String, MethodBody> {
        match kind {
            MethodKind::Instance => &self.instance_methods,
            MethodKind::Class => &self.class_methods,
        }
    }

    /// Looks up a class variable.
    #[must_use]
    pub fn class_var(&self, name: &str) -> Option<&Value> {
        self.class_vars.get(name)
    }

    /// All class variables.
    #[must_use]
    pub fn class_vars(&self) -> &BTreeMap<String, Value> {
        &self.class_vars
    }

    /// Looks up a class-instance variable.
    #[must_use]
    pub fn class_instance_var(&self, name: &str) -> Option<&Value> {
        self.class_instance_vars.get(name)
    }

    /// All class-instance variables.
    #[must_use]
    pub fn class_instance_vars(&self) -> &BTreeMap<String, Value> {
        &self.class_instance_vars
    }

    /// Reopens the class with `other`'s definitions; `other` wins on clashes.
    pub fn merge(&mut self, other: &ClassEntry) {
        for (selector, body) in &other.instance_methods {
            self.instance_methods.insert(selector.clone(), body.clone());
        }
        for (selector, body) in &other.class_methods {
            self.class_methods.insert(selector.clone(), body.clone());
        }
        for (name, value) in &other.class_vars {
            self.class_vars.insert(name.clone(), value.clone());
        }
        for (name, value) in &other.class_instance_vars {
            self.class_instance_vars.insert(name.clone(), value.clone());
        }
    }

    pub(crate) fn methods_mut(&mut self, kind: MethodKind) -> &mut BTreeMap<String, MethodBody> {
        match kind {
            MethodKind::Instance => &mut self.instance_methods,
            MethodKind::Class => &mut self.class_methods,
        }
    }

    pub(crate) fn class_vars_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.class_vars
    }

    pub(crate) fn class_instance_vars_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.class_instance_vars
    }
}

/// Class entries keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    entries: BTreeMap<String, ClassEntry>,
}

impl ClassTable {
    /// Looks up a class.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClassEntry> {
        self.entries.get(name)
    }

    /// True if the class exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Class names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut ClassEntry> {
        self.entries.get_mut(name)
    }

    pub(crate) fn put(&mut self, name: &str, entry: Option<ClassEntry>) -> Option<ClassEntry> {
        match entry {
            Some(entry) => self.entries.insert(name.to_string(), entry),
            None => self.entries.remove(name),
        }
    }
}
