use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use simcache_core::config::SweepConfig;
use simcache_core::errors::{ErrorInfo, SimError};
use simcache_core::params::Params;
use simcache_fp::Fingerprint;
use simcache_store::{PutOutcome, RunFacets, RunStore};
use tracing::{debug, info, warn};

use crate::compute::Computation;
use crate::plan::{PlanEntry, SweepPlan};
use crate::runner::build_record;

/// Options governing sweep execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Number of entries computed concurrently.
    pub parallelism: usize,
    /// Skip every entry not yet started once one entry fails.
    pub stop_on_failure: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            parallelism: 1,
            stop_on_failure: false,
        }
    }
}

impl From<&SweepConfig> for ExecuteOptions {
    fn from(config: &SweepConfig) -> Self {
        Self {
            parallelism: config.parallelism,
            stop_on_failure: config.stop_on_failure,
        }
    }
}

/// Outcome of one plan entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum EntryStatus {
    /// Already stored; the computation was not invoked.
    Cached,
    /// Computed and committed by this sweep.
    Computed,
    /// The computation or its commit failed; other entries are unaffected.
    Failed(SimError),
    /// Not attempted because an earlier entry failed under `stop_on_failure`.
    Skipped,
}

impl EntryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EntryStatus::Cached => "cached",
            EntryStatus::Computed => "computed",
            EntryStatus::Failed(_) => "failed",
            EntryStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryReport {
    pub index: usize,
    pub params: Params,
    pub seed: u64,
    pub fingerprint: Fingerprint,
    pub status: EntryStatus,
}

/// Per-entry results, in plan order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub entries: Vec<EntryReport>,
}

impl SweepReport {
    fn count(&self, label: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status.label() == label)
            .count()
    }

    pub fn computed(&self) -> usize {
        self.count("computed")
    }

    pub fn cached(&self) -> usize {
        self.count("cached")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    /// True when any entry failed or was skipped.
    pub fn has_failures(&self) -> bool {
        self.failed() > 0 || self.skipped() > 0
    }
}

/// Runs every uncached entry of `plan` and commits the results.
///
/// Per-entry failures are recorded in the report. Only structural store
/// failures (see [`SimError::is_structural`]) abort the sweep.
pub fn execute(
    plan: &SweepPlan,
    store: &RunStore,
    computation: &dyn Computation,
    opts: &ExecuteOptions,
) -> Result<SweepReport, SimError> {
    if computation.code_version() != &plan.code_version {
        return Err(SimError::Config(
            ErrorInfo::new(
                "sweep.code_version",
                "computation does not match the code version the plan was built for",
            )
            .with_context("plan", plan.code_version.to_string())
            .with_context("computation", computation.code_version().to_string()),
        ));
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.parallelism.max(1))
        .build()
        .map_err(|err| SimError::Config(ErrorInfo::new("sweep.thread_pool", err.to_string())))?;
    let stop = AtomicBool::new(false);

    let results: Result<Vec<EntryReport>, SimError> = pool.install(|| {
        plan.entries
            .par_iter()
            .map(|entry| {
                let status = process_entry(plan, entry, store, computation, opts, &stop)?;
                Ok(EntryReport {
                    index: entry.index,
                    params: entry.params.clone(),
                    seed: entry.seed,
                    fingerprint: entry.fingerprint.clone(),
                    status,
                })
            })
            .collect()
    });
    let mut entries = results?;
    entries.sort_by_key(|entry| entry.index);
    let report = SweepReport { entries };
    info!(
        computed = report.computed(),
        cached = report.cached(),
        failed = report.failed(),
        skipped = report.skipped(),
        "sweep finished"
    );
    Ok(report)
}

fn process_entry(
    plan: &SweepPlan,
    entry: &PlanEntry,
    store: &RunStore,
    computation: &dyn Computation,
    opts: &ExecuteOptions,
    stop: &AtomicBool,
) -> Result<EntryStatus, SimError> {
    if stop.load(Ordering::SeqCst) {
        return Ok(EntryStatus::Skipped);
    }
    // Re-checked here: another entry or process may have committed it
    // since planning.
    if entry.cached || store.exists(&entry.fingerprint)? {
        debug!(fingerprint = %entry.fingerprint.short(), "entry cached");
        return Ok(EntryStatus::Cached);
    }

    let output = match computation.run(&entry.params, entry.seed) {
        Ok(output) => output,
        Err(err) if err.is_structural() => return Err(err),
        Err(err) => return Ok(fail(entry, err, opts, stop)),
    };
    let facets = RunFacets {
        code_version: plan.code_version.clone(),
        params: entry.params.clone(),
        seed: entry.seed,
        environment: plan.environment.clone(),
    };
    let record = build_record(
        entry.fingerprint.clone(),
        facets,
        output,
        plan.tags.clone(),
        plan.plot_config.as_ref(),
    );
    match store.put(&record) {
        Ok(PutOutcome::Committed) => {
            info!(fingerprint = %entry.fingerprint.short(), seed = entry.seed, "entry computed");
            Ok(EntryStatus::Computed)
        }
        Ok(PutOutcome::AlreadyPresent) => {
            debug!(fingerprint = %entry.fingerprint.short(), "entry committed concurrently");
            Ok(EntryStatus::Cached)
        }
        Err(err) if err.is_structural() => Err(err),
        Err(err) => Ok(fail(entry, err, opts, stop)),
    }
}

fn fail(entry: &PlanEntry, err: SimError, opts: &ExecuteOptions, stop: &AtomicBool) -> EntryStatus {
    warn!(fingerprint = %entry.fingerprint.short(), seed = entry.seed, %err, "entry failed");
    if opts.stop_on_failure {
        stop.store(true, Ordering::SeqCst);
    }
    EntryStatus::Failed(err)
}
