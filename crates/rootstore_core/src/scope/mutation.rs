//! Recorded mutations and the slots they address.

use crate::class::{ClassEntry, MethodBody, MethodKind};
use crate::error::CoreResult;
use crate::object::{ObjectRef, Value};
use crate::types::Symbol;
use crate::view::WorkingView;

/// Address of one mutable location in a working view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    /// A persistent root.
    Root(Symbol),
    /// A top-level constant.
    Constant(String),
    /// A named field of an object.
    Field(ObjectRef, String),
    /// An element appended to a list object.
    ///
    /// Pushes are not positional. The scope stack undoes each one by
    /// removing its own element, wherever later pushes have left it.
    Push(ObjectRef),
    /// A whole class entry.
    Class(String),
    /// One method of a class.
    Method(String, MethodKind, String),
    /// A class variable.
    ClassVar(String, String),
    /// A class-instance variable.
    ClassInstanceVar(String, String),
}

impl Slot {
    /// The durable unit this slot belongs to.
    #[must_use]
    pub fn target(&self) -> Target {
        match self {
            Self::Root(key) => Target::Root(key.clone()),
            Self::Constant(name) => Target::Constant(name.clone()),
            Self::Field(obj, _) | Self::Push(obj) => Target::Object(obj.clone()),
            Self::Class(name)
            | Self::Method(name, _, _)
            | Self::ClassVar(name, _)
            | Self::ClassInstanceVar(name, _) => Target::Class(name.clone()),
        }
    }
}

/// Content of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    /// A plain value (roots, constants, fields, variables).
    Value(Value),
    /// A class entry.
    Class(ClassEntry),
    /// A method body.
    Method(MethodBody),
}

/// A unit that commit serializes as a whole.
///
/// Objects are compared by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A persistent root.
    Root(Symbol),
    /// An object.
    Object(ObjectRef),
    /// A class entry.
    Class(String),
    /// A constant.
    Constant(String),
}

/// One change to one slot, with the state it replaced.
#[derive(Debug, Clone)]
pub struct Mutation {
    slot: Slot,
    before: Option<SlotValue>,
    after: Option<SlotValue>,
}

impl Mutation {
    pub(crate) fn new(slot: Slot, before: Option<SlotValue>, after: Option<SlotValue>) -> Self {
        Self {
            slot,
            before,
            after,
        }
    }

    /// The slot written.
    #[must_use]
    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    /// Slot content before the write (`None` = absent).
    #[must_use]
    pub fn before(&self) -> Option<&SlotValue> {
        self.before.as_ref()
    }

    /// Slot content after the write (`None` = removed).
    #[must_use]
    pub fn after(&self) -> Option<&SlotValue> {
        self.after.as_ref()
    }

    /// The appended element, for pushes.
    pub(crate) fn pushed(&self) -> Option<(&ObjectRef, &Value)> {
        match (&self.slot, &self.after) {
            (Slot::Push(list), Some(SlotValue::Value(value))) => Some((list, value)),
            _ => None,
        }
    }

    /// Restores the slot's previous content.
    pub(crate) fn undo(&self, view: &mut WorkingView) -> CoreResult<()> {
        view.write_slot(&self.slot, self.before.clone())
    }

    /// Writes the slot's new content again.
    pub(crate) fn redo(&self, view: &mut WorkingView) -> CoreResult<()> {
        view.write_slot(&self.slot, self.after.clone())
    }
}

/// A mutation as recorded in a scope.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    seq: u64,
    prev: Option<u64>,
    mutation: Mutation,
}

impl PendingWrite {
    pub(crate) fn new(seq: u64, prev: Option<u64>, mutation: Mutation) -> Self {
        Self {
            seq,
            prev,
            mutation,
        }
    }

    /// Session-wide recording order.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The write this one replaced in the same slot, if that write was
    /// made in this session since the stack was last idle.
    #[must_use]
    pub fn prev(&self) -> Option<u64> {
        self.prev
    }

    /// The recorded mutation.
    #[must_use]
    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    /// Takes over the predecessor and prior content of a discarded write
    /// that this one overwrote.
    pub(crate) fn rebase(&mut self, prev: Option<u64>, before: Option<SlotValue>) {
        self.prev = prev;
        self.mutation.before = before;
    }
}
