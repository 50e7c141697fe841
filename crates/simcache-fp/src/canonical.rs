use std::fmt::Write as _;

use simcache_core::errors::{ErrorInfo, SimError};
use simcache_core::params::{non_finite_label, ParamValue, Params};

/// Switches controlling parameter canonicalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalOptions {
    /// Encode NaN and infinities instead of rejecting them.
    pub allow_non_finite: bool,
}

/// Renders `params` into its canonical text form.
///
/// Keys are emitted in sorted order and every scalar carries a type tag, so
/// `1` (`I1;`) and `1.0` (`R1e0;`) stay distinct while each value has exactly
/// one encoding.
pub fn canonical_params(params: &Params, opts: CanonicalOptions) -> Result<String, SimError> {
    let mut out = String::new();
    write_map(params.iter(), opts, "", &mut out)?;
    Ok(out)
}

/// Renders a single value, mainly for diagnostics and tests.
pub fn canonical_value(value: &ParamValue, opts: CanonicalOptions) -> Result<String, SimError> {
    let mut out = String::new();
    write_value(value, opts, "", &mut out)?;
    Ok(out)
}

fn write_map<'a>(
    entries: impl Iterator<Item = (&'a String, &'a ParamValue)>,
    opts: CanonicalOptions,
    path: &str,
    out: &mut String,
) -> Result<(), SimError> {
    out.push('{');
    for (idx, (key, value)) in entries.enumerate() {
        if idx > 0 {
            out.push(',');
        }
        push_quoted(key, out);
        out.push(':');
        let child = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        write_value(value, opts, &child, out)?;
    }
    out.push('}');
    Ok(())
}

fn write_value(
    value: &ParamValue,
    opts: CanonicalOptions,
    path: &str,
    out: &mut String,
) -> Result<(), SimError> {
    match value {
        ParamValue::Null => out.push('N'),
        ParamValue::Bool(true) => out.push('T'),
        ParamValue::Bool(false) => out.push('F'),
        ParamValue::Int(int) => {
            let _ = write!(out, "I{int};");
        }
        ParamValue::UInt(uint) => {
            // Values that fit in i64 share the signed encoding.
            let _ = write!(out, "I{uint};");
        }
        ParamValue::Float(float) => write_float(*float, opts, path, out)?,
        ParamValue::Str(text) => {
            out.push('S');
            push_quoted(text, out);
        }
        ParamValue::List(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_value(item, opts, &format!("{path}[{idx}]"), out)?;
            }
            out.push(']');
        }
        ParamValue::Map(map) => write_map(map.iter(), opts, path, out)?,
    }
    Ok(())
}

fn write_float(
    value: f64,
    opts: CanonicalOptions,
    path: &str,
    out: &mut String,
) -> Result<(), SimError> {
    if !value.is_finite() {
        if !opts.allow_non_finite {
            return Err(SimError::UnhashableInput(
                ErrorInfo::new(
                    "fingerprint.non_finite",
                    format!("parameter value {} is not finite", non_finite_label(value)),
                )
                .with_context("param", path.to_string())
                .with_hint("set fingerprint.allow_non_finite to hash NaN and infinities"),
            ));
        }
        let _ = write!(out, "R{};", non_finite_label(value));
        return Ok(());
    }
    let normalized = if value == 0.0 { 0.0 } else { value };
    let _ = write!(out, "R{normalized:e};");
    Ok(())
}

fn push_quoted(text: &str, out: &mut String) {
    out.push_str(&serde_json::Value::from(text).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> CanonicalOptions {
        CanonicalOptions::default()
    }

    #[test]
    fn int_and_float_are_distinct() {
        assert_eq!(canonical_value(&ParamValue::Int(1), opts()).unwrap(), "I1;");
        assert_eq!(canonical_value(&ParamValue::Float(1.0), opts()).unwrap(), "R1e0;");
        assert_eq!(canonical_value(&ParamValue::UInt(1), opts()).unwrap(), "I1;");
    }

    #[test]
    fn floats_use_shortest_round_trip() {
        assert_eq!(canonical_value(&ParamValue::Float(0.01), opts()).unwrap(), "R1e-2;");
        assert_eq!(canonical_value(&ParamValue::Float(-0.0), opts()).unwrap(), "R0e0;");
        assert_eq!(
            canonical_value(&ParamValue::Float(0.1 + 0.2), opts()).unwrap(),
            "R3.0000000000000004e-1;"
        );
    }

    #[test]
    fn nested_maps_sort_keys() {
        let mut params = Params::new();
        params.insert("z".into(), ParamValue::Int(1));
        params.insert(
            "a".into(),
            ParamValue::List(vec![ParamValue::Str("x".into()), ParamValue::Null]),
        );
        assert_eq!(
            canonical_params(&params, opts()).unwrap(),
            r#"{"a":[S"x",N],"z":I1;}"#
        );
    }

    #[test]
    fn non_finite_rejected_with_path() {
        let mut params = Params::new();
        params.insert(
            "grid".into(),
            ParamValue::List(vec![ParamValue::Float(1.0), ParamValue::Float(f64::NAN)]),
        );
        let err = canonical_params(&params, opts()).unwrap_err();
        assert!(matches!(err, SimError::UnhashableInput(_)));
        assert_eq!(err.info().context["param"], "grid[1]");

        let allowed = CanonicalOptions {
            allow_non_finite: true,
        };
        assert_eq!(
            canonical_params(&params, allowed).unwrap(),
            r#"{"grid":[R1e0;,Rnan;]}"#
        );
    }
}
