use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use simcache_core::params::params_to_json;
use simcache_core::serde::to_canonical_json_bytes;
use simcache_sweep::{execute, load_computation, EntryStatus, ExecuteOptions, Grid, SweepPlan};

use super::{parse_code_version, GlobalOpts, Session};

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// YAML or JSON grid file.
    pub grid: PathBuf,
    /// Script to execute, or `builtin:<name>`.
    pub script: String,
    #[arg(long)]
    pub interpreter: Option<String>,
    #[arg(long)]
    pub code_version: Option<String>,
    /// Entries computed concurrently; overrides `sweep.parallelism`.
    #[arg(long)]
    pub parallelism: Option<usize>,
    /// Skip remaining entries after the first failure.
    #[arg(long)]
    pub stop_on_failure: bool,
}

pub fn run(global: &GlobalOpts, args: &SweepArgs) -> Result<(), Box<dyn Error>> {
    let session = Session::open(global)?;
    let grid = Grid::load(&args.grid)?;
    let computation = load_computation(
        &args.script,
        args.interpreter.as_deref(),
        parse_code_version(args.code_version.as_deref())?,
    )?;
    let plan = SweepPlan::build(
        &grid,
        computation.code_version(),
        &session.environment,
        &session.engine,
        &session.store,
    )?;

    let mut opts = ExecuteOptions::from(&session.config.sweep);
    if let Some(parallelism) = args.parallelism {
        opts.parallelism = parallelism;
    }
    opts.stop_on_failure |= args.stop_on_failure;

    let report = execute(&plan, &session.store, computation.as_ref(), &opts)?;
    for entry in &report.entries {
        let params = String::from_utf8(to_canonical_json_bytes(&params_to_json(&entry.params))?)?;
        println!(
            "{} {} {} seed={}",
            entry.status.label(),
            entry.fingerprint,
            params,
            entry.seed
        );
        if let EntryStatus::Failed(err) = &entry.status {
            eprintln!("  {}: {err}", entry.fingerprint.short());
        }
    }
    let mut summary = format!(
        "computed={} cached={} failed={}",
        report.computed(),
        report.cached(),
        report.failed()
    );
    if report.skipped() > 0 {
        summary.push_str(&format!(" skipped={}", report.skipped()));
    }
    println!("{summary}");

    if report.has_failures() {
        return Err(format!("{} of {} entries failed", report.failed(), plan.len()).into());
    }
    Ok(())
}
