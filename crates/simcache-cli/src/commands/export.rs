use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use simcache_store::ExportFormat;

use super::{open_store, GlobalOpts};

#[derive(Args, Debug)]
pub struct ExportArgs {
    pub run_id: String,
    /// Destination file. Its extension picks the format unless `--format`
    /// is given.
    #[arg(long)]
    pub to: PathBuf,
    /// One of json, csv or bin.
    #[arg(long)]
    pub format: Option<String>,
}

pub fn run(global: &GlobalOpts, args: &ExportArgs) -> Result<(), Box<dyn Error>> {
    let store = open_store(global)?;
    let fingerprint = store.resolve(&args.run_id)?;
    let format = args.format.as_deref().map(ExportFormat::parse).transpose()?;
    store.export(&fingerprint, &args.to, format)?;
    println!("{}", args.to.display());
    Ok(())
}
