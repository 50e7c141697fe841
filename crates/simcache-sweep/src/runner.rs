use serde_json::Value;
use simcache_core::errors::SimError;
use simcache_core::params::Params;
use simcache_fp::{Environment, Fingerprint, FingerprintEngine};
use simcache_store::{PutOutcome, RunFacets, RunRecord, RunStore};
use tracing::{debug, info};

use crate::compute::{Computation, ComputationOutput};

/// Inputs of a single run besides the computation itself.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub params: Params,
    pub seed: u64,
    pub tags: Vec<String>,
    pub plot_config: Option<Value>,
    /// Recompute even on a cache hit and require the result to match the
    /// stored record.
    pub verify: bool,
}

impl RunRequest {
    pub fn new(params: Params, seed: u64) -> Self {
        Self {
            params,
            seed,
            tags: Vec::new(),
            plot_config: None,
            verify: false,
        }
    }
}

/// What `run_single` did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub fingerprint: Fingerprint,
    /// True when the computation was invoked by this call.
    pub computed: bool,
    pub record: RunRecord,
}

/// Executes one run or returns the stored result for its fingerprint.
///
/// With `verify`, a cache hit is recomputed and committed through `put`, so
/// a computation that no longer reproduces its record fails with
/// [`SimError::DuplicateRun`] instead of overwriting it.
pub fn run_single(
    store: &RunStore,
    engine: &FingerprintEngine,
    computation: &dyn Computation,
    environment: &Environment,
    request: &RunRequest,
) -> Result<RunOutcome, SimError> {
    let code_version = computation.code_version();
    let fingerprint = engine.compute(code_version, &request.params, request.seed, environment)?;
    if !request.verify && store.exists(&fingerprint)? {
        debug!(fingerprint = %fingerprint.short(), "cache hit");
        let record = store.get(&fingerprint)?;
        return Ok(RunOutcome {
            fingerprint,
            computed: false,
            record,
        });
    }

    let output = computation.run(&request.params, request.seed)?;
    let facets = RunFacets {
        code_version: code_version.clone(),
        params: request.params.clone(),
        seed: request.seed,
        environment: environment.clone(),
    };
    let record = build_record(
        fingerprint.clone(),
        facets,
        output,
        request.tags.clone(),
        request.plot_config.as_ref(),
    );
    let record = match store.put(&record)? {
        PutOutcome::Committed => {
            info!(fingerprint = %fingerprint.short(), "computed run");
            record
        }
        PutOutcome::AlreadyPresent => {
            info!(fingerprint = %fingerprint.short(), "recomputed run matches stored record");
            store.get(&fingerprint)?
        }
    };
    Ok(RunOutcome {
        fingerprint,
        computed: true,
        record,
    })
}

pub(crate) fn build_record(
    fingerprint: Fingerprint,
    facets: RunFacets,
    output: ComputationOutput,
    tags: Vec<String>,
    plot_config: Option<&Value>,
) -> RunRecord {
    RunRecord::new(fingerprint, facets, output.arrays, output.metadata, tags)
        .with_plot_config(plot_config.cloned())
}
