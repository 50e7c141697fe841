use std::error::Error;

use clap::Args;
use simcache_core::serde::to_pretty_json_string;

use super::{open_store, GlobalOpts};

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Remove stale staging and damaged runs, then rebuild the index.
    #[arg(long)]
    pub repair: bool,
}

pub fn run(global: &GlobalOpts, args: &DoctorArgs) -> Result<(), Box<dyn Error>> {
    let store = open_store(global)?;
    let report = if args.repair {
        store.repair()?
    } else {
        store.check()?
    };
    println!("{}", to_pretty_json_string(&report)?);
    if !report.is_healthy() {
        let hint = if args.repair { "" } else { "; rerun with --repair" };
        return Err(format!("store needs attention{hint}").into());
    }
    Ok(())
}
