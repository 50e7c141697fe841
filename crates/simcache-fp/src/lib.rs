//! Fingerprint engine: turns the four run facets into one stable identifier.
//!
//! A fingerprint is the SHA-256 of the domain tag followed by four framed
//! facets: code version, canonical parameters, seed and canonical
//! environment. The engine performs no I/O.

mod canonical;
mod code;
pub mod env;
mod hash;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use simcache_core::config::FingerprintConfig;
use simcache_core::errors::{ErrorInfo, SimError};
use simcache_core::params::Params;

pub use canonical::{canonical_params, canonical_value, CanonicalOptions};
pub use code::CodeVersion;
pub use env::{AllowList, Environment, ENV_SCHEMA_VERSION, TOOL_VERSION};
pub use hash::{sha256_hex, stable_hash_string, FINGERPRINT_DOMAIN};

use hash::FramedHasher;

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 64;

/// Identifier of a run: 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parses a full fingerprint.
    pub fn parse(text: &str) -> Result<Self, SimError> {
        let valid = text.len() == FINGERPRINT_LEN
            && text
                .bytes()
                .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));
        if !valid {
            return Err(SimError::RunNotFound(
                ErrorInfo::new("fingerprint.malformed", "not a valid run id")
                    .with_context("run_id", text.to_string()),
            ));
        }
        Ok(Self(text.to_string()))
    }

    /// Returns the hex text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character directory shard used by the store layout.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    /// Leading characters for compact display.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = SimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

/// Fingerprint engine carrying canonicalization options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FingerprintEngine {
    options: CanonicalOptions,
}

impl FingerprintEngine {
    /// Creates an engine with explicit options.
    pub fn new(options: CanonicalOptions) -> Self {
        Self { options }
    }

    /// Creates an engine from the `fingerprint` configuration section.
    pub fn from_config(config: &FingerprintConfig) -> Self {
        Self::new(CanonicalOptions {
            allow_non_finite: config.allow_non_finite,
        })
    }

    /// Computes the fingerprint of one run.
    pub fn compute(
        &self,
        code_version: &CodeVersion,
        params: &Params,
        seed: u64,
        environment: &Environment,
    ) -> Result<Fingerprint, SimError> {
        let params_text = canonical_params(params, self.options)?;
        let mut hasher = FramedHasher::new(FINGERPRINT_DOMAIN);
        hasher.frame(b'c', code_version.as_str().as_bytes());
        hasher.frame(b'p', params_text.as_bytes());
        hasher.frame(b's', &seed.to_be_bytes());
        hasher.frame(b'e', &environment.canonical_bytes());
        Ok(Fingerprint(hasher.finish_hex()))
    }
}

/// Computes a fingerprint with default options (non-finite floats rejected).
pub fn compute(
    code_version: &CodeVersion,
    params: &Params,
    seed: u64,
    environment: &Environment,
) -> Result<Fingerprint, SimError> {
    FingerprintEngine::default().compute(code_version, params, seed, environment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!(Fingerprint::parse("abc").is_err());
        assert!(Fingerprint::parse(&"G".repeat(64)).is_err());
        assert!(Fingerprint::parse(&"A".repeat(64)).is_err());
        let fp = Fingerprint::parse(&"0f".repeat(32)).unwrap();
        assert_eq!(fp.shard(), "0f");
        assert_eq!(fp.short().len(), 12);
    }

    #[test]
    fn serde_round_trip_validates() {
        let fp = Fingerprint::parse(&"ab".repeat(32)).unwrap();
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(serde_json::from_str::<Fingerprint>(&json).unwrap(), fp);
        assert!(serde_json::from_str::<Fingerprint>("\"xyz\"").is_err());
    }
}
