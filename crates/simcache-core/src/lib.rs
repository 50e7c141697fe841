#![deny(missing_docs)]
#![doc = "Core types, errors and configuration shared by the simcache crates."]

pub mod array;
pub mod config;
pub mod errors;
pub mod params;
pub mod rng;
pub mod serde;

pub use array::{json_kind, NamedArrays, NdArray};
pub use config::{CacheConfig, EnvironmentConfig, FingerprintConfig, SweepConfig};
pub use errors::{ErrorInfo, SimError};
pub use params::{params_to_json, ParamValue, Params};
pub use rng::RngHandle;
pub use self::serde::{from_json_slice, from_yaml_slice, to_canonical_json_bytes, to_pretty_json_string};
