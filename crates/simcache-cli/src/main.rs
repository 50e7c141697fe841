use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::{
    doctor::{self, DoctorArgs},
    export::{self, ExportArgs},
    info::{self, InfoArgs},
    latest::{self, LatestArgs},
    ls::{self, LsArgs},
    run::{self, RunArgs},
    sweep::{self, SweepArgs},
    GlobalOpts,
};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "simcache",
    version,
    about = "Fingerprint-keyed cache for simulation results"
)]
struct Cli {
    /// Root directory of the run store.
    #[arg(long, global = true, env = "SIMCACHE_STORE", default_value = ".simcache")]
    store: PathBuf,
    /// Configuration file; defaults to `<store>/config.yaml` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter written to stderr (e.g. `info`, `simcache_store=debug`).
    #[arg(long, global = true, default_value = "warn")]
    log: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute a run, or print the id of the stored result.
    Run(RunArgs),
    /// List stored runs, newest first.
    Ls(LsArgs),
    /// Print the record document of one run.
    Info(InfoArgs),
    /// Print the newest run carrying a tag.
    Latest(LatestArgs),
    /// Write a run's arrays to a file.
    Export(ExportArgs),
    /// Expand a grid and compute only the runs not yet stored.
    Sweep(SweepArgs),
    /// Check the index against the stored runs.
    Doctor(DoctorArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<(), Box<dyn Error>> {
    let global = GlobalOpts {
        store: cli.store,
        config: cli.config,
    };
    match cli.command {
        Command::Run(args) => run::run(&global, &args),
        Command::Ls(args) => ls::run(&global, &args),
        Command::Info(args) => info::run(&global, &args),
        Command::Latest(args) => latest::run(&global, &args),
        Command::Export(args) => export::run(&global, &args),
        Command::Sweep(args) => sweep::run(&global, &args),
        Command::Doctor(args) => doctor::run(&global, &args),
    }
}
