pub mod doctor;
pub mod export;
pub mod info;
pub mod latest;
pub mod ls;
pub mod run;
pub mod sweep;

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use simcache_core::config::{CacheConfig, CONFIG_FILE_NAME};
use simcache_core::errors::SimError;
use simcache_core::params::Params;
use simcache_core::serde::from_yaml_slice;
use simcache_fp::{AllowList, CodeVersion, Environment, FingerprintEngine};
use simcache_store::RunStore;
use tracing::debug;

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalOpts {
    pub store: PathBuf,
    pub config: Option<PathBuf>,
}

/// Store handle plus the per-invocation fingerprint inputs.
pub struct Session {
    pub store: RunStore,
    pub config: CacheConfig,
    pub engine: FingerprintEngine,
    /// Captured once per invocation.
    pub environment: Environment,
}

impl Session {
    pub fn open(global: &GlobalOpts) -> Result<Self, SimError> {
        let store = RunStore::open(&global.store)?;
        let config = match &global.config {
            Some(path) => CacheConfig::load(path)?,
            None => CacheConfig::load_or_default(&global.store.join(CONFIG_FILE_NAME))?,
        };
        let environment = Environment::capture(&AllowList::from_config(&config.environment));
        debug!(store = %global.store.display(), facts = environment.facts.len(), "session opened");
        Ok(Self {
            store,
            engine: FingerprintEngine::from_config(&config.fingerprint),
            config,
            environment,
        })
    }
}

/// Opens the store alone, for commands that never fingerprint.
pub fn open_store(global: &GlobalOpts) -> Result<RunStore, SimError> {
    RunStore::open(&global.store)
}

fn read(path: &Path) -> Result<Vec<u8>, SimError> {
    fs::read(path).map_err(|err| SimError::io("cli.read", path, err))
}

/// Reads a YAML or JSON parameter mapping. An empty file means no
/// parameters.
pub fn load_params(path: Option<&Path>) -> Result<Params, SimError> {
    let Some(path) = path else {
        return Ok(Params::new());
    };
    let params: Option<Params> = from_yaml_slice(&read(path)?)?;
    Ok(params.unwrap_or_default())
}

pub fn load_document(path: Option<&Path>) -> Result<Option<Value>, SimError> {
    match path {
        Some(path) => from_yaml_slice(&read(path)?),
        None => Ok(None),
    }
}

pub fn parse_code_version(token: Option<&str>) -> Result<Option<CodeVersion>, SimError> {
    token.map(CodeVersion::new).transpose()
}
