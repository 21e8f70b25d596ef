//! Human-readable rendering of values.
//!
//! Rendering follows the object graph and uses a [`RecursionGuard`] so a
//! cycle prints as `[...]` or `#<Class ...>` instead of recursing forever.

use crate::guard::RecursionGuard;
use crate::object::{ObjectBody, ObjectRef, Value};
use std::fmt::{self, Write};

/// Renders `value`.
///
/// ```
/// use rootstore_core::{inspect, ObjectRef, Value};
///
/// let hat = ObjectRef::with_fields("Hat", [("size", Value::from(7))]);
/// assert_eq!(inspect(&Value::from(&hat)), "#<Hat @size=7>");
/// ```
#[must_use]
pub fn inspect(value: &Value) -> String {
    let mut out = String::new();
    let mut guard = RecursionGuard::new();
    // Writing to a String cannot fail.
    let _ = write_value(&mut out, value, &mut guard);
    out
}

/// Renders `value` into `out`, sharing `guard` with an enclosing traversal.
pub fn write_value<W: Write>(out: &mut W, value: &Value, guard: &mut RecursionGuard) -> fmt::Result {
    match value {
        Value::Nil => out.write_str("nil"),
        Value::Bool(b) => write!(out, "{b}"),
        Value::Integer(n) => write!(out, "{n}"),
        Value::Text(s) => write!(out, "{s:?}"),
        Value::Symbol(s) => write!(out, "{s}"),
        Value::Object(obj) => write_object(out, obj, guard),
    }
}

fn write_object<W: Write>(out: &mut W, obj: &ObjectRef, guard: &mut RecursionGuard) -> fmt::Result {
    let class = obj.class_name();
    if guard.is_being_visited(obj) {
        return if obj.is_list() {
            out.write_str("[...]")
        } else {
            write!(out, "#<{class} ...>")
        };
    }

    guard.visit(obj, |guard| match obj.body() {
        ObjectBody::List(items) => {
            out.write_char('[')?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write_value(out, item, guard)?;
            }
            out.write_char(']')
        }
        ObjectBody::Fields(fields) => {
            write!(out, "#<{class}")?;
            for (i, (name, value)) in fields.iter().enumerate() {
                out.write_str(if i == 0 { " " } else { ", " })?;
                write!(out, "@{name}=")?;
                write_value(out, value, guard)?;
            }
            out.write_char('>')
        }
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, &mut RecursionGuard::new())
    }
}
