//! Property-based test generators using proptest.
//!
//! Strategies for root keys, scalar values, classes and object graphs,
//! plus a canonical [`GraphShape`] for comparing graphs across sessions.

use proptest::prelude::*;
use rootstore_core::{
    ClassEntry, CoreResult, MethodBody, ObjectBody, ObjectRef, SessionView, Symbol, Value,
};

/// Strategy for generating root keys.
pub fn root_key_strategy() -> impl Strategy<Value = Symbol> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}")
        .expect("Invalid regex")
        .prop_map(Symbol::from)
}

/// Strategy for generating class names.
pub fn class_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9]{0,15}").expect("Invalid regex")
}

/// Strategy for generating field, variable and selector names.
pub fn member_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,9}").expect("Invalid regex")
}

/// Strategy for generating non-object values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        1 => Just(Value::Nil),
        1 => any::<bool>().prop_map(Value::Bool),
        3 => any::<i64>().prop_map(Value::Integer),
        3 => ".{0,32}".prop_map(Value::Text),
        1 => root_key_strategy().prop_map(Value::Symbol),
    ]
}

/// Strategy for generating method bodies.
pub fn method_body_strategy() -> impl Strategy<Value = MethodBody> {
    prop_oneof![
        scalar_value_strategy().prop_map(MethodBody::Constant),
        member_name_strategy().prop_map(MethodBody::Field),
        member_name_strategy().prop_map(MethodBody::ClassVar),
        member_name_strategy().prop_map(MethodBody::ClassInstanceVar),
    ]
}

/// Strategy for generating class entries with a few members of each kind.
pub fn class_entry_strategy() -> impl Strategy<Value = ClassEntry> {
    let members = || prop::collection::btree_map(member_name_strategy(), method_body_strategy(), 0..4);
    let vars = || prop::collection::btree_map(member_name_strategy(), scalar_value_strategy(), 0..3);
    (class_name_strategy(), members(), members(), vars(), vars()).prop_map(
        |(name, instance, class, class_vars, instance_vars)| {
            let mut entry = ClassEntry::new(name);
            for (selector, body) in instance {
                entry = entry.with_instance_method(selector, body);
            }
            for (selector, body) in class {
                entry = entry.with_class_method(selector, body);
            }
            for (name, value) in class_vars {
                entry = entry.with_class_var(name, value);
            }
            for (name, value) in instance_vars {
                entry = entry.with_class_instance_var(name, value);
            }
            entry
        },
    )
}

/// One object of a generated graph.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    /// Class name.
    pub class: String,
    /// Scalar fields.
    pub scalars: Vec<(String, Value)>,
    /// Reference fields, by node index. May point back to any node.
    pub links: Vec<(String, usize)>,
}

/// A generated object graph. Node 0 is the entry point.
#[derive(Debug, Clone)]
pub struct GraphSpec {
    /// The objects.
    pub nodes: Vec<NodeSpec>,
}

impl GraphSpec {
    /// Builds the graph in the session's innermost scope and returns the
    /// entry object. Links are set after all objects exist, so cycles and
    /// shared references come out as generated.
    pub fn build(&self, session: &mut SessionView) -> CoreResult<Value> {
        let objects: Vec<ObjectRef> = self
            .nodes
            .iter()
            .map(|node| ObjectRef::with_fields(node.class.clone(), node.scalars.clone()))
            .collect();
        for (node, obj) in self.nodes.iter().zip(&objects) {
            for (name, target) in &node.links {
                session.set_field(obj, name, &objects[*target])?;
            }
        }
        Ok(Value::Object(objects[0].clone()))
    }
}

/// Strategy for generating graphs of up to `max_nodes` objects.
pub fn graph_spec_strategy(max_nodes: usize) -> impl Strategy<Value = GraphSpec> {
    (1..=max_nodes.max(1)).prop_flat_map(|count| {
        let node = (
            class_name_strategy(),
            prop::collection::vec((member_name_strategy(), scalar_value_strategy()), 0..3),
            prop::collection::vec((member_name_strategy(), 0..count), 0..3),
        )
            .prop_map(|(class, scalars, links)| NodeSpec {
                class,
                scalars,
                links,
            });
        prop::collection::vec(node, count).prop_map(|nodes| GraphSpec { nodes })
    })
}

/// Content of one field or element in a [`GraphShape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeValue {
    /// A non-object value.
    Scalar(Value),
    /// A reference to the node with this index.
    Node(usize),
}

/// One object in a [`GraphShape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeNode {
    /// Class name.
    pub class: String,
    /// Fields sorted by name, or list elements in order.
    pub members: Vec<(Option<String>, ShapeValue)>,
}

/// Structure of an object graph with identities replaced by discovery order.
///
/// Two graphs have equal shapes exactly when they are isomorphic from the
/// entry value, so a graph read back in another session compares equal to
/// the one that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphShape {
    /// The entry value.
    pub entry: ShapeValue,
    /// Objects in discovery order.
    pub nodes: Vec<ShapeNode>,
}

impl GraphShape {
    /// Computes the shape of everything reachable from `value`.
    pub fn of(value: &Value) -> Self {
        let mut seen: Vec<ObjectRef> = Vec::new();
        let mut nodes = Vec::new();
        let entry = shape_value(value, &mut seen);
        let mut next = 0;
        while next < seen.len() {
            let obj = seen[next].clone();
            let members = match obj.body() {
                ObjectBody::Fields(fields) => fields
                    .iter()
                    .map(|(name, v)| (Some(name.clone()), shape_value(v, &mut seen)))
                    .collect(),
                ObjectBody::List(items) => items
                    .iter()
                    .map(|v| (None, shape_value(v, &mut seen)))
                    .collect(),
            };
            nodes.push(ShapeNode {
                class: obj.class_name(),
                members,
            });
            next += 1;
        }
        Self { entry, nodes }
    }
}

fn shape_value(value: &Value, seen: &mut Vec<ObjectRef>) -> ShapeValue {
    match value {
        Value::Object(obj) => match seen.iter().position(|known| known.ptr_eq(obj)) {
            Some(index) => ShapeValue::Node(index),
            None => {
                seen.push(obj.clone());
                ShapeValue::Node(seen.len() - 1)
            }
        },
        scalar => ShapeValue::Scalar(scalar.clone()),
    }
}

/// One step of a generated scope workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeOp {
    /// Open a persistent scope.
    EnterPersistent,
    /// Open a transient scope.
    EnterTransient,
    /// Write an integer to one of a few root keys.
    Write {
        /// Index into the key pool.
        key: usize,
        /// Value written.
        value: i64,
    },
    /// Remove one of the root keys.
    Remove {
        /// Index into the key pool.
        key: usize,
    },
    /// Append an integer to the shared list.
    Push {
        /// Value appended.
        value: i64,
    },
    /// Close the innermost scope.
    Close,
    /// Commit the nearest persistent scope.
    Commit,
}

/// Root keys addressed by [`ScopeOp`] indices.
pub const SCOPE_OP_KEYS: [&str; 3] = ["hat", "coat", "scarf"];

/// Strategy for generating one scope operation.
pub fn scope_op_strategy() -> impl Strategy<Value = ScopeOp> {
    prop_oneof![
        2 => Just(ScopeOp::EnterPersistent),
        2 => Just(ScopeOp::EnterTransient),
        4 => (0..SCOPE_OP_KEYS.len(), 0..4i64).prop_map(|(key, value)| ScopeOp::Write { key, value }),
        1 => (0..SCOPE_OP_KEYS.len()).prop_map(|key| ScopeOp::Remove { key }),
        2 => (0..4i64).prop_map(|value| ScopeOp::Push { value }),
        2 => Just(ScopeOp::Close),
        2 => Just(ScopeOp::Commit),
    ]
}

/// Strategy for generating a sequence of scope operations.
pub fn scope_op_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<ScopeOp>> {
    prop::collection::vec(scope_op_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
