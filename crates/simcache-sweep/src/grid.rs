use std::fs;
use std::path::Path;

use serde_json::Value;
use serde_yaml::{Mapping, Value as YamlValue};
use simcache_core::errors::{ErrorInfo, SimError};
use simcache_core::params::{ParamValue, Params};

/// Seeds used when a grid names none.
pub const DEFAULT_SEEDS: [u64; 1] = [0];

/// A parameter grid with its declared parameter order preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// Parameter name and candidate values, in declaration order.
    pub params: Vec<(String, Vec<ParamValue>)>,
    pub seeds: Vec<u64>,
    pub tags: Vec<String>,
    /// Opaque plotting configuration, stored with every run of the sweep.
    pub plot_config: Option<Value>,
}

fn grid_error(message: impl Into<String>) -> SimError {
    SimError::Config(ErrorInfo::new("sweep.grid", message))
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            params: Vec::new(),
            seeds: DEFAULT_SEEDS.to_vec(),
            tags: Vec::new(),
            plot_config: None,
        }
    }
}

impl Grid {
    /// Reads a YAML or JSON grid file.
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let bytes = fs::read(path).map_err(|err| SimError::io("sweep.grid_read", path, err))?;
        Self::from_slice(&bytes).map_err(|err| match err {
            SimError::Config(info) => {
                SimError::Config(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Parses a grid document.
    ///
    /// Recognised keys: `params` (name to value list; a scalar counts as a
    /// one-value list), `seeds` or `seed`, `tags` (list or single string) and
    /// `plot_config`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SimError> {
        let doc: YamlValue = serde_yaml::from_slice(bytes)
            .map_err(|err| grid_error(format!("grid is not valid YAML or JSON: {err}")))?;
        let map = match doc {
            YamlValue::Null => return Ok(Self::default()),
            YamlValue::Mapping(map) => map,
            _ => return Err(grid_error("grid must be a mapping")),
        };

        let mut grid = Self::default();
        let mut seen_seeds = false;
        for (key, value) in map {
            let key = key
                .as_str()
                .ok_or_else(|| grid_error("grid keys must be strings"))?
                .to_string();
            match key.as_str() {
                "params" => grid.params = parse_params(value)?,
                "seeds" | "seed" => {
                    if seen_seeds {
                        return Err(grid_error("give either `seeds` or `seed`, not both"));
                    }
                    seen_seeds = true;
                    grid.seeds = parse_seeds(value)?;
                }
                "tags" => grid.tags = parse_tags(value)?,
                "plot_config" => {
                    grid.plot_config = Some(serde_yaml::from_value(value).map_err(|err| {
                        grid_error(format!("plot_config is not representable as JSON: {err}"))
                    })?)
                }
                other => {
                    return Err(SimError::Config(
                        ErrorInfo::new("sweep.grid_key", format!("unknown grid key `{other}`"))
                            .with_hint("expected params, seeds, seed, tags or plot_config"),
                    ))
                }
            }
        }
        Ok(grid)
    }

    /// Number of parameter combinations.
    pub fn combination_count(&self) -> usize {
        self.params.iter().map(|(_, values)| values.len()).product()
    }

    /// Number of plan entries: combinations times seeds.
    pub fn len(&self) -> usize {
        self.combination_count() * self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cross product of the parameter values, first declared parameter
    /// varying slowest. No parameters yield one empty combination.
    pub fn combinations(&self) -> Vec<Params> {
        let mut out = Vec::with_capacity(self.combination_count());
        expand(&self.params, Params::new(), &mut out);
        out
    }
}

fn expand(rest: &[(String, Vec<ParamValue>)], current: Params, out: &mut Vec<Params>) {
    let Some(((name, values), tail)) = rest.split_first() else {
        out.push(current);
        return;
    };
    for value in values {
        let mut next = current.clone();
        next.insert(name.clone(), value.clone());
        expand(tail, next, out);
    }
}

fn parse_params(value: YamlValue) -> Result<Vec<(String, Vec<ParamValue>)>, SimError> {
    let map: Mapping = match value {
        YamlValue::Null => return Ok(Vec::new()),
        YamlValue::Mapping(map) => map,
        _ => return Err(grid_error("`params` must map names to value lists")),
    };
    let mut params = Vec::with_capacity(map.len());
    for (key, values) in map {
        let name = key
            .as_str()
            .ok_or_else(|| grid_error("parameter names must be strings"))?
            .to_string();
        let values = match values {
            YamlValue::Sequence(items) => items,
            scalar => vec![scalar],
        };
        if values.is_empty() {
            return Err(SimError::Config(
                ErrorInfo::new("sweep.grid_empty", "parameter has no values")
                    .with_context("param", name),
            ));
        }
        let values = values
            .into_iter()
            .map(|item| {
                serde_yaml::from_value::<ParamValue>(item).map_err(|err| {
                    SimError::Config(
                        ErrorInfo::new("sweep.grid_value", err.to_string())
                            .with_context("param", name.clone()),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        params.push((name, values));
    }
    Ok(params)
}

fn parse_seeds(value: YamlValue) -> Result<Vec<u64>, SimError> {
    let items = match value {
        YamlValue::Sequence(items) => items,
        scalar => vec![scalar],
    };
    if items.is_empty() {
        return Err(grid_error("seed list is empty"));
    }
    items
        .into_iter()
        .map(|item| {
            item.as_u64().ok_or_else(|| {
                SimError::Config(
                    ErrorInfo::new("sweep.grid", format!("seed {item:?} is not a non-negative integer"))
                        .with_hint("seeds are unsigned 64-bit integers"),
                )
            })
        })
        .collect()
}

fn parse_tags(value: YamlValue) -> Result<Vec<String>, SimError> {
    match value {
        YamlValue::Null => Ok(Vec::new()),
        YamlValue::String(tag) => Ok(vec![tag]),
        YamlValue::Sequence(items) => items
            .into_iter()
            .map(|item| match item {
                YamlValue::String(tag) => Ok(tag),
                other => Err(grid_error(format!("tag {other:?} is not a string"))),
            })
            .collect(),
        _ => Err(grid_error("`tags` must be a string or a list of strings")),
    }
}
