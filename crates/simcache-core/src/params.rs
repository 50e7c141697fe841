//! Parameter values accepted by computations and hashed into fingerprints.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;

/// Key under which stored documents tag a non-finite float, as in
/// `{"$float": "inf"}`. JSON has no literal for these values.
pub const NON_FINITE_TAG: &str = "$float";

/// Parameter mapping for one run. Key order never matters.
pub type Params = BTreeMap<String, ParamValue>;

/// A scalar, list or nested mapping supplied as a run parameter.
///
/// Unlike `serde_json::Value` this keeps non-finite floats (YAML `.nan`,
/// `.inf`) intact so the fingerprint engine can reject them explicitly
/// instead of having them silently collapse to `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Explicit absence of a value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer too large for `i64`.
    UInt(u64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Str(String),
    /// Ordered list.
    List(Vec<ParamValue>),
    /// Nested mapping.
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Converts a JSON value. JSON cannot carry non-finite floats, so this is
    /// lossless.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ParamValue::Null,
            Value::Bool(flag) => ParamValue::Bool(*flag),
            Value::Number(num) => {
                if let Some(int) = num.as_i64() {
                    ParamValue::Int(int)
                } else if let Some(uint) = num.as_u64() {
                    ParamValue::UInt(uint)
                } else {
                    ParamValue::Float(num.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(text) => ParamValue::Str(text.clone()),
            Value::Array(items) => ParamValue::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => ParamValue::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Renders the value as JSON for computations and metadata documents.
    /// Non-finite floats become the strings `"nan"`, `"inf"` and `"-inf"`.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(flag) => Value::Bool(*flag),
            ParamValue::Int(int) => Value::from(*int),
            ParamValue::UInt(uint) => Value::from(*uint),
            ParamValue::Float(float) => serde_json::Number::from_f64(*float)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(non_finite_label(*float).to_string())),
            ParamValue::Str(text) => Value::String(text.clone()),
            ParamValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            ParamValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Label used for non-finite floats in text renderings.
pub fn non_finite_label(value: f64) -> &'static str {
    if value.is_nan() {
        "nan"
    } else if value.is_sign_negative() {
        "-inf"
    } else {
        "inf"
    }
}

fn parse_non_finite_label(label: &str) -> Option<f64> {
    match label {
        "nan" => Some(f64::NAN),
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

/// Converts a whole parameter mapping into a JSON object.
pub fn params_to_json(params: &Params) -> Value {
    Value::Object(
        params
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Null => serializer.serialize_unit(),
            ParamValue::Bool(flag) => serializer.serialize_bool(*flag),
            ParamValue::Int(int) => serializer.serialize_i64(*int),
            ParamValue::UInt(uint) => serializer.serialize_u64(*uint),
            ParamValue::Float(float) if float.is_finite() => serializer.serialize_f64(*float),
            ParamValue::Float(float) => {
                let mut tagged = serializer.serialize_map(Some(1))?;
                tagged.serialize_entry(NON_FINITE_TAG, non_finite_label(*float))?;
                tagged.end()
            }
            ParamValue::Str(text) => serializer.serialize_str(text),
            ParamValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ParamValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

struct ParamVisitor;

impl<'de> Visitor<'de> for ParamVisitor {
    type Value = ParamValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a parameter value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<ParamValue, E> {
        Ok(ParamValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<ParamValue, E> {
        Ok(ParamValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<ParamValue, D::Error> {
        ParamValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<ParamValue, E> {
        Ok(ParamValue::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<ParamValue, E> {
        Ok(ParamValue::Int(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<ParamValue, E> {
        Ok(i64::try_from(value)
            .map(ParamValue::Int)
            .unwrap_or(ParamValue::UInt(value)))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<ParamValue, E> {
        Ok(ParamValue::Float(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<ParamValue, E> {
        Ok(ParamValue::Str(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<ParamValue, E> {
        Ok(ParamValue::Str(value))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ParamValue, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(ParamValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ParamValue, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, ParamValue>()? {
            map.insert(key, value);
        }
        if map.len() == 1 {
            if let Some(ParamValue::Str(label)) = map.get(NON_FINITE_TAG) {
                if let Some(float) = parse_non_finite_label(label) {
                    return Ok(ParamValue::Float(float));
                }
            }
        }
        Ok(ParamValue::Map(map))
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ParamVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn yaml_keeps_non_finite_floats() {
        let params: Params = serde_yaml::from_str("a: .nan\nb: -.inf\nc: 1\nd: 1.0").unwrap();
        assert!(matches!(params["a"], ParamValue::Float(v) if v.is_nan()));
        assert_eq!(params["b"], ParamValue::Float(f64::NEG_INFINITY));
        assert_eq!(params["c"], ParamValue::Int(1));
        assert_eq!(params["d"], ParamValue::Float(1.0));
    }

    #[test]
    fn json_round_trip() {
        let raw = json!({"steps": 100, "dt": 0.01, "name": "x", "opts": {"k": [1, 2]}});
        let params: Params = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(params_to_json(&params), raw);
        assert_eq!(ParamValue::from_json(&raw).to_json(), raw);
    }

    #[test]
    fn non_finite_floats_survive_json_documents() {
        let mut params = Params::new();
        params.insert("hi".into(), ParamValue::Float(f64::INFINITY));
        params.insert("lo".into(), ParamValue::Float(f64::NEG_INFINITY));
        params.insert("nan".into(), ParamValue::Float(f64::NAN));
        params.insert("text".into(), ParamValue::Str("inf".into()));

        let doc = serde_json::to_value(&params).unwrap();
        assert_eq!(doc["hi"], json!({"$float": "inf"}));
        assert_eq!(doc["text"], "inf");

        let back: Params = serde_json::from_value(doc).unwrap();
        assert_eq!(back["hi"], ParamValue::Float(f64::INFINITY));
        assert_eq!(back["lo"], ParamValue::Float(f64::NEG_INFINITY));
        assert!(matches!(back["nan"], ParamValue::Float(v) if v.is_nan()));
        assert_eq!(back["text"], ParamValue::Str("inf".into()));
    }
}
