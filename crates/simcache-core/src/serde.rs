//! Canonical JSON and YAML helpers.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ErrorInfo, SimError};

fn serde_error(code: &str, err: impl ToString) -> SimError {
    SimError::Serde(ErrorInfo::new(code, err.to_string()))
}

/// Rebuilds `value` with object keys in byte order at every depth.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        scalar => scalar,
    }
}

fn to_sorted_value<T: Serialize>(value: &T) -> Result<Value, SimError> {
    serde_json::to_value(value)
        .map(sort_keys)
        .map_err(|err| serde_error("json_serialize", err))
}

/// Compact JSON with sorted keys: the byte form hashed for digests and
/// written to exports.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, SimError> {
    serde_json::to_vec(&to_sorted_value(value)?).map_err(|err| serde_error("json_write", err))
}

/// Serializes a value into indented JSON with sorted keys, for documents
/// meant to be read by people.
pub fn to_pretty_json_string<T: Serialize>(value: &T) -> Result<String, SimError> {
    serde_json::to_string_pretty(&to_sorted_value(value)?).map_err(|err| serde_error("json_write", err))
}

/// Deserializes a value from JSON bytes.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, SimError> {
    serde_json::from_slice(data).map_err(|err| serde_error("json_deserialize", err))
}

/// Deserializes a YAML (or JSON) payload into the requested type.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, SimError> {
    serde_yaml::from_slice(data).map_err(|err| serde_error("yaml_deserialize", err))
}
