use serde_json::{Map, Value};
use simcache_core::array::{json_kind, NamedArrays, NdArray};
use simcache_core::errors::{ErrorInfo, SimError};
use simcache_core::params::Params;
use simcache_fp::CodeVersion;
use simcache_store::Metadata;

use crate::builtin::{builtin, builtin_names, BUILTIN_SCHEME};
use crate::script::ScriptComputation;

/// A user computation: `(params, seed)` in, named arrays out.
///
/// `invoke` returns the raw JSON result; callers validate it with
/// [`ComputationOutput::from_raw`] so every implementation is held to the
/// same shape rules.
pub trait Computation: Send + Sync {
    /// Token identifying the implementation, hashed into every fingerprint.
    fn code_version(&self) -> &CodeVersion;

    fn invoke(&self, params: &Params, seed: u64) -> Result<Value, SimError>;

    /// Invokes and validates in one step.
    fn run(&self, params: &Params, seed: u64) -> Result<ComputationOutput, SimError> {
        ComputationOutput::from_raw(self.invoke(params, seed)?)
    }
}

/// Validated result of one computation.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputationOutput {
    pub arrays: NamedArrays,
    pub metadata: Metadata,
}

fn shape_error(message: impl Into<String>) -> SimError {
    SimError::InvalidResultShape(
        ErrorInfo::new("compute.result_shape", message)
            .with_hint("return {name: array, ...}, [arrays, metadata] or {\"arrays\": .., \"metadata\": ..}"),
    )
}

impl ComputationOutput {
    /// Accepts an object of named arrays, a two-element list
    /// `[arrays, metadata]`, or an object with exactly the keys `arrays`
    /// and (optionally) `metadata`.
    pub fn from_raw(raw: Value) -> Result<Self, SimError> {
        let (arrays, metadata) = match raw {
            Value::Array(mut pair) if pair.len() == 2 => {
                let metadata = pair.pop().unwrap_or(Value::Null);
                let arrays = pair.pop().unwrap_or(Value::Null);
                (arrays, metadata)
            }
            Value::Array(items) => {
                return Err(shape_error(format!(
                    "expected a pair of (arrays, metadata), found a list of {} items",
                    items.len()
                )))
            }
            Value::Object(mut map) if is_wrapped(&map) => {
                let arrays = map.remove("arrays").unwrap_or(Value::Null);
                let metadata = map.remove("metadata").unwrap_or_else(|| Value::Object(Map::new()));
                (arrays, metadata)
            }
            object @ Value::Object(_) => (object, Value::Object(Map::new())),
            other => {
                return Err(shape_error(format!(
                    "result must be a mapping of named arrays, found {}",
                    json_kind(&other)
                )))
            }
        };

        let arrays = match arrays {
            Value::Object(map) => map,
            other => {
                return Err(shape_error(format!(
                    "arrays must be a mapping, found {}",
                    json_kind(&other)
                )))
            }
        };
        let metadata = match metadata {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(shape_error(format!(
                    "metadata must be a mapping, found {}",
                    json_kind(&other)
                )))
            }
        };
        if arrays.is_empty() {
            return Err(shape_error("result contains no arrays"));
        }
        let arrays = arrays
            .into_iter()
            .map(|(name, value)| {
                NdArray::from_json(&value)
                    .map(|array| (name.clone(), array))
                    .map_err(|err| {
                        SimError::InvalidResultShape(
                            err.info().clone().with_context("array", name.clone()),
                        )
                    })
            })
            .collect::<Result<NamedArrays, _>>()?;
        Ok(Self { arrays, metadata })
    }
}

/// Resolves a computation target: `builtin:<name>` or a script path.
///
/// `interpreter` and `code_version` only apply to scripts; a built-in
/// always carries its own version token.
pub fn load_computation(
    target: &str,
    interpreter: Option<&str>,
    code_version: Option<CodeVersion>,
) -> Result<Box<dyn Computation>, SimError> {
    if let Some(name) = target.strip_prefix(BUILTIN_SCHEME) {
        return builtin(name).ok_or_else(|| {
            SimError::Config(
                ErrorInfo::new("compute.unknown_builtin", format!("no built-in computation `{name}`"))
                    .with_hint(format!("available: {}", builtin_names().join(", "))),
            )
        });
    }
    let mut script = ScriptComputation::new(target)?;
    if let Some(interpreter) = interpreter {
        script = script.with_interpreter(interpreter);
    }
    if let Some(code_version) = code_version {
        script = script.with_code_version(code_version);
    }
    Ok(Box::new(script))
}

fn is_wrapped(map: &Map<String, Value>) -> bool {
    matches!(map.get("arrays"), Some(Value::Object(_)))
        && map.keys().all(|key| key == "arrays" || key == "metadata")
}
