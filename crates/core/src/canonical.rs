//! Canonical encoding for signed messages.
//!
//! Every signature in FetchCraft is computed over the bytes produced here, and
//! every verifier recomputes them with the same function. The encoding is
//! compact JSON with object keys sorted lexicographically at every depth.
//! Sorting is done explicitly so the output does not depend on whether
//! serde_json's `preserve_order` feature is enabled somewhere in the
//! dependency graph.
//!
//! Numbers and string escapes are written by serde_json, which is stable for
//! a given value.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{CoreError, Result};

/// Name of the field excluded from signable bytes
pub const SIGNATURE_FIELD: &str = "signature";

/// Canonical bytes of an arbitrary serializable value.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value).map_err(|e| CoreError::Serialization(e.to_string()))?;
    Ok(encode_value(value))
}

/// Canonical bytes of a message with its top-level `signature` field removed.
///
/// The message must serialize to a JSON object.
pub fn signable_bytes<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let value =
        serde_json::to_value(message).map_err(|e| CoreError::Serialization(e.to_string()))?;
    match value {
        Value::Object(mut map) => {
            map.remove(SIGNATURE_FIELD);
            Ok(encode_value(Value::Object(map)))
        }
        other => Err(CoreError::Serialization(format!(
            "signed message must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Canonical bytes of an already-built JSON value.
pub fn encode_value(value: Value) -> Vec<u8> {
    sort_keys(value).to_string().into_bytes()
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, child) in entries {
                sorted.insert(key, sort_keys(child));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
