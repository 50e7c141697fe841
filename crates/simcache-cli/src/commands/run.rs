use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use simcache_sweep::{load_computation, run_single, RunRequest};

use super::{load_document, load_params, parse_code_version, GlobalOpts, Session};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Script to execute, or `builtin:<name>`.
    pub script: String,
    /// YAML or JSON parameter mapping.
    #[arg(long)]
    pub params: Option<PathBuf>,
    /// Random seed, a non-negative integer below 2^64.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// Label attached to a newly computed run. Repeatable.
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Program used to run the script, e.g. `python3`.
    #[arg(long)]
    pub interpreter: Option<String>,
    /// Explicit code version token instead of the script hash.
    #[arg(long)]
    pub code_version: Option<String>,
    /// Plot configuration stored with the run.
    #[arg(long)]
    pub plot_config: Option<PathBuf>,
    /// Recompute on a cache hit and fail if the result differs.
    #[arg(long)]
    pub verify: bool,
}

pub fn run(global: &GlobalOpts, args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let session = Session::open(global)?;
    let computation = load_computation(
        &args.script,
        args.interpreter.as_deref(),
        parse_code_version(args.code_version.as_deref())?,
    )?;
    let mut request = RunRequest::new(load_params(args.params.as_deref())?, args.seed);
    request.tags = args.tags.clone();
    request.plot_config = load_document(args.plot_config.as_deref())?;
    request.verify = args.verify;

    let outcome = run_single(
        &session.store,
        &session.engine,
        computation.as_ref(),
        &session.environment,
        &request,
    )?;
    println!("{}", outcome.fingerprint);
    Ok(())
}
