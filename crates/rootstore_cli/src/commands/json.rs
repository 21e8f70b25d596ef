//! JSON rendering of stored values.

use rootstore_codec::Value as Cbor;
use rootstore_core::{ObjectBody, ObjectRef, RecursionGuard, Value};
use serde_json::{json, Map, Value as Json};

/// Renders a live value. A reference back into an object being rendered
/// becomes `{"cycle": ...}`.
pub fn value_to_json(value: &Value, guard: &mut RecursionGuard) -> Json {
    match value {
        Value::Nil => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(n) => json!(n),
        Value::Text(s) => Json::String(s.clone()),
        Value::Symbol(s) => json!({ "symbol": s.as_str() }),
        Value::Object(obj) => object_to_json(obj, guard),
    }
}

fn object_to_json(obj: &ObjectRef, guard: &mut RecursionGuard) -> Json {
    let oid = obj.oid().map(|oid| oid.as_u64());
    if guard.is_being_visited(obj) {
        return json!({ "cycle": obj.class_name(), "oid": oid });
    }
    guard.visit(obj, |guard| match obj.body() {
        ObjectBody::List(items) => {
            Json::Array(items.iter().map(|item| value_to_json(item, guard)).collect())
        }
        ObjectBody::Fields(fields) => {
            let fields: Map<String, Json> = fields
                .iter()
                .map(|(name, value)| (name.clone(), value_to_json(value, guard)))
                .collect();
            json!({ "class": obj.class_name(), "oid": oid, "fields": fields })
        }
    })
}

/// Renders a raw stored payload. Tags become `{"tag": n, "value": ...}`.
pub fn cbor_to_json(value: &Cbor) -> Json {
    match value {
        Cbor::Null => Json::Null,
        Cbor::Bool(b) => Json::Bool(*b),
        Cbor::Integer(n) => json!(n),
        Cbor::Bytes(bytes) => Json::String(bytes.iter().map(|b| format!("{b:02x}")).collect()),
        Cbor::Text(s) => Json::String(s.clone()),
        Cbor::Array(items) => Json::Array(items.iter().map(cbor_to_json).collect()),
        Cbor::Map(pairs) => {
            let map: Map<String, Json> = pairs
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        Cbor::Text(s) => s.clone(),
                        other => cbor_to_json(other).to_string(),
                    };
                    (key, cbor_to_json(v))
                })
                .collect();
            Json::Object(map)
        }
        Cbor::Tag(tag, inner) => json!({ "tag": tag, "value": cbor_to_json(inner) }),
    }
}
