//! Dense numeric arrays produced by computations and persisted by the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ErrorInfo, SimError};

/// Named outputs of a single run, ordered by name.
pub type NamedArrays = BTreeMap<String, NdArray>;

/// Row-major n-dimensional array of `f64` values.
///
/// A scalar has an empty shape and exactly one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdArray {
    /// Extent along each axis.
    pub shape: Vec<usize>,
    /// Flattened row-major data; `data.len()` equals the product of `shape`.
    pub data: Vec<f64>,
}

fn shape_error(message: impl Into<String>) -> SimError {
    SimError::InvalidResultShape(ErrorInfo::new("array.shape", message))
}

impl NdArray {
    /// Creates an array, validating that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, SimError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(shape_error(format!(
                "shape {shape:?} expects {expected} elements, found {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Creates a one-dimensional array.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Creates a zero-dimensional array holding one value.
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true when the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Parses a JSON number or a rectangular nested list of numbers.
    pub fn from_json(value: &Value) -> Result<Self, SimError> {
        let mut shape = Vec::new();
        probe_shape(value, &mut shape);
        let mut data = Vec::new();
        flatten(value, &shape, 0, &mut data)?;
        Self::new(shape, data)
    }

    /// Renders the array back into nested JSON lists.
    pub fn to_json(&self) -> Value {
        if self.shape.is_empty() {
            return number(self.data.first().copied().unwrap_or(0.0));
        }
        nest(&self.shape, &self.data)
    }
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn nest(shape: &[usize], data: &[f64]) -> Value {
    match shape.split_first() {
        None => number(data.first().copied().unwrap_or(0.0)),
        Some((_, [])) => Value::Array(data.iter().copied().map(number).collect()),
        Some((&outer, rest)) => {
            let stride: usize = rest.iter().product();
            Value::Array(
                (0..outer)
                    .map(|idx| nest(rest, &data[idx * stride..(idx + 1) * stride]))
                    .collect(),
            )
        }
    }
}

fn probe_shape(value: &Value, shape: &mut Vec<usize>) {
    if let Value::Array(items) = value {
        shape.push(items.len());
        if let Some(first) = items.first() {
            probe_shape(first, shape);
        }
    }
}

fn flatten(value: &Value, shape: &[usize], depth: usize, out: &mut Vec<f64>) -> Result<(), SimError> {
    match value {
        Value::Number(num) if depth == shape.len() => {
            let float = num
                .as_f64()
                .ok_or_else(|| shape_error(format!("number {num} is not representable as f64")))?;
            out.push(float);
            Ok(())
        }
        Value::Array(items) if depth < shape.len() => {
            if items.len() != shape[depth] {
                return Err(shape_error(format!(
                    "ragged nesting at depth {depth}: expected {} items, found {}",
                    shape[depth],
                    items.len()
                )));
            }
            for item in items {
                flatten(item, shape, depth + 1, out)?;
            }
            Ok(())
        }
        Value::Array(_) | Value::Number(_) => Err(shape_error(format!(
            "inconsistent nesting depth at level {depth}"
        ))),
        other => Err(shape_error(format!(
            "expected a number or list of numbers, found {}",
            json_kind(other)
        ))),
    }
}

/// Short name of a JSON value's type, for diagnostics.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
