use std::f64::consts::TAU;

use serde_json::{json, Value};
use simcache_core::errors::{ErrorInfo, SimError};
use simcache_core::params::{ParamValue, Params};
use simcache_core::rng::RngHandle;
use simcache_fp::CodeVersion;

use crate::compute::Computation;

/// Prefix selecting a built-in computation instead of a script path.
pub const BUILTIN_SCHEME: &str = "builtin:";

pub const NOISY_SINE: &str = "noisy-sine";

/// Looks up a built-in computation by name (without the scheme).
pub fn builtin(name: &str) -> Option<Box<dyn Computation>> {
    match name {
        NOISY_SINE => Some(Box::new(NoisySine::new())),
        _ => None,
    }
}

/// Names of every built-in computation.
pub fn builtin_names() -> &'static [&'static str] {
    &[NOISY_SINE]
}

/// Sine wave with Gaussian noise: `x = sin(2πt) + noise·N(0,1)` sampled at
/// `t = i·dt` for `i < steps`.
///
/// Parameters: `steps` (default 200), `dt` (0.01), `noise` (0.1).
#[derive(Debug, Clone)]
pub struct NoisySine {
    code_version: CodeVersion,
}

impl NoisySine {
    pub fn new() -> Self {
        Self {
            code_version: CodeVersion::builtin(NOISY_SINE),
        }
    }
}

impl Default for NoisySine {
    fn default() -> Self {
        Self::new()
    }
}

fn param_error(name: &str, message: &str) -> SimError {
    SimError::Computation(
        ErrorInfo::new("compute.param", message.to_string()).with_context("param", name),
    )
}

fn float_param(params: &Params, name: &str, default: f64) -> Result<f64, SimError> {
    match params.get(name) {
        None => Ok(default),
        Some(ParamValue::Float(value)) if value.is_finite() => Ok(*value),
        Some(ParamValue::Int(value)) => Ok(*value as f64),
        Some(ParamValue::UInt(value)) => Ok(*value as f64),
        Some(_) => Err(param_error(name, "expected a finite number")),
    }
}

fn steps_param(params: &Params, default: usize) -> Result<usize, SimError> {
    match params.get("steps") {
        None => Ok(default),
        Some(ParamValue::Int(value)) => {
            usize::try_from(*value).map_err(|_| param_error("steps", "expected a non-negative integer"))
        }
        Some(ParamValue::UInt(value)) => {
            usize::try_from(*value).map_err(|_| param_error("steps", "step count too large"))
        }
        Some(_) => Err(param_error("steps", "expected a non-negative integer")),
    }
}

impl Computation for NoisySine {
    fn code_version(&self) -> &CodeVersion {
        &self.code_version
    }

    fn invoke(&self, params: &Params, seed: u64) -> Result<Value, SimError> {
        let steps = steps_param(params, 200)?;
        let dt = float_param(params, "dt", 0.01)?;
        let noise = float_param(params, "noise", 0.1)?;

        let mut rng = RngHandle::from_seed(seed);
        let t: Vec<f64> = (0..steps).map(|i| i as f64 * dt).collect();
        let x: Vec<f64> = t
            .iter()
            .map(|&ti| (TAU * ti).sin() + noise * rng.standard_normal())
            .collect();
        Ok(json!([
            {"t": t, "x": x},
            {"units": {"t": "s", "x": "arb"}},
        ]))
    }
}
