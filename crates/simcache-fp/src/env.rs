//! Environment facet: a versioned allow-list of runtime facts.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use simcache_core::config::EnvironmentConfig;
use simcache_core::errors::{ErrorInfo, SimError};

/// Version of the allow-list contract. Bump when the built-in fact set
/// changes, since that changes every fingerprint.
pub const ENV_SCHEMA_VERSION: u32 = 1;

/// Version of the simcache tool recorded in the `simcache` fact.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Facts captured for every run regardless of configuration.
pub const BUILTIN_FACTS: [&str; 4] = ["arch", "family", "os", "simcache"];

const VARIABLE_PREFIX: &str = "env.";

/// Enumerates which fact names may appear in an [`Environment`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    variables: BTreeSet<String>,
}

impl AllowList {
    /// Allow-list holding only the built-in facts.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Built-in facts plus the configured environment variables.
    pub fn from_config(config: &EnvironmentConfig) -> Self {
        Self {
            variables: config.variables.iter().cloned().collect(),
        }
    }

    /// Admits an additional environment variable.
    pub fn with_variable(mut self, name: impl Into<String>) -> Self {
        self.variables.insert(name.into());
        self
    }

    /// Returns true when `key` names an allowed fact.
    pub fn permits(&self, key: &str) -> bool {
        if BUILTIN_FACTS.contains(&key) {
            return true;
        }
        key.strip_prefix(VARIABLE_PREFIX)
            .map(|name| self.variables.contains(name))
            .unwrap_or(false)
    }

    /// Configured variable names in sorted order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(String::as_str)
    }
}

/// Runtime facts recorded alongside, and hashed into, every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Allow-list schema version the facts were captured under.
    pub schema: u32,
    /// Fact name to value.
    pub facts: BTreeMap<String, String>,
}

impl Environment {
    /// Collects the allowed facts from the running process.
    pub fn capture(allow: &AllowList) -> Self {
        let mut facts = BTreeMap::new();
        facts.insert("arch".to_string(), std::env::consts::ARCH.to_string());
        facts.insert("family".to_string(), std::env::consts::FAMILY.to_string());
        facts.insert("os".to_string(), std::env::consts::OS.to_string());
        facts.insert("simcache".to_string(), TOOL_VERSION.to_string());
        for name in allow.variables() {
            if let Ok(value) = std::env::var(name) {
                facts.insert(format!("{VARIABLE_PREFIX}{name}"), value);
            }
        }
        Self {
            schema: ENV_SCHEMA_VERSION,
            facts,
        }
    }

    /// Builds an environment from explicit facts, rejecting anything the
    /// allow-list does not name.
    pub fn from_facts(
        facts: BTreeMap<String, String>,
        allow: &AllowList,
    ) -> Result<Self, SimError> {
        if let Some(key) = facts.keys().find(|key| !allow.permits(key)) {
            return Err(SimError::UnhashableInput(
                ErrorInfo::new(
                    "fingerprint.env_fact",
                    "environment fact is not on the allow-list",
                )
                .with_context("fact", key.clone())
                .with_hint("list extra variables under environment.variables"),
            ));
        }
        Ok(Self {
            schema: ENV_SCHEMA_VERSION,
            facts,
        })
    }

    /// Canonical byte form: a schema line, then sorted `key=value` lines
    /// with JSON-quoted values.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = format!("schema={}\n", self.schema);
        for (key, value) in &self.facts {
            out.push_str(key);
            out.push('=');
            out.push_str(&serde_json::Value::from(value.as_str()).to_string());
            out.push('\n');
        }
        out.into_bytes()
    }
}
