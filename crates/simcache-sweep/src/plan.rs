use serde::Serialize;
use serde_json::Value;
use simcache_core::errors::SimError;
use simcache_core::params::Params;
use simcache_fp::{CodeVersion, Environment, Fingerprint, FingerprintEngine};
use simcache_store::RunStore;
use tracing::debug;

use crate::grid::Grid;

/// One `(params, seed)` pair of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    pub index: usize,
    pub params: Params,
    pub seed: u64,
    pub fingerprint: Fingerprint,
    /// Whether the store held this fingerprint when the plan was built.
    pub cached: bool,
}

/// Ordered expansion of a grid against one code version and environment.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    pub code_version: CodeVersion,
    pub environment: Environment,
    pub tags: Vec<String>,
    pub plot_config: Option<Value>,
    pub entries: Vec<PlanEntry>,
}

impl SweepPlan {
    /// Expands `grid` and marks entries already present in `store`.
    ///
    /// The store is only read. Entries follow the grid's declared order with
    /// seeds varying fastest.
    pub fn build(
        grid: &Grid,
        code_version: &CodeVersion,
        environment: &Environment,
        engine: &FingerprintEngine,
        store: &RunStore,
    ) -> Result<Self, SimError> {
        let mut entries = Vec::with_capacity(grid.len());
        for params in grid.combinations() {
            for &seed in &grid.seeds {
                let fingerprint = engine.compute(code_version, &params, seed, environment)?;
                let cached = store.exists(&fingerprint)?;
                entries.push(PlanEntry {
                    index: entries.len(),
                    params: params.clone(),
                    seed,
                    fingerprint,
                    cached,
                });
            }
        }
        let plan = Self {
            code_version: code_version.clone(),
            environment: environment.clone(),
            tags: grid.tags.clone(),
            plot_config: grid.plot_config.clone(),
            entries,
        };
        debug!(
            entries = plan.len(),
            pending = plan.pending().count(),
            "built sweep plan"
        );
        Ok(plan)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries the store did not hold at planning time.
    pub fn pending(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|entry| !entry.cached)
    }

    pub fn cached_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.cached).count()
    }
}
