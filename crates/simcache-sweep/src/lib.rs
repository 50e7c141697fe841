//! Sweep planning and execution.
//!
//! A [`Grid`] expands into a [`SweepPlan`] of `(params, seed)` entries, each
//! fingerprinted and checked against the store. [`execute`] then invokes the
//! [`Computation`] only for entries the store does not hold, isolating
//! per-entry failures. [`run_single`] is the one-entry variant used by
//! `simcache run`.

mod builtin;
mod compute;
mod execute;
mod grid;
mod plan;
mod runner;
mod script;

pub use builtin::{builtin, builtin_names, NoisySine, BUILTIN_SCHEME, NOISY_SINE};
pub use compute::{load_computation, Computation, ComputationOutput};
pub use execute::{execute, EntryReport, EntryStatus, ExecuteOptions, SweepReport};
pub use grid::{Grid, DEFAULT_SEEDS};
pub use plan::{PlanEntry, SweepPlan};
pub use runner::{run_single, RunOutcome, RunRequest};
pub use script::ScriptComputation;
