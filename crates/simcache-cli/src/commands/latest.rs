use std::error::Error;

use clap::Args;
use simcache_core::serde::to_pretty_json_string;

use super::{open_store, GlobalOpts};

#[derive(Args, Debug)]
pub struct LatestArgs {
    #[arg(long)]
    pub tag: String,
}

pub fn run(global: &GlobalOpts, args: &LatestArgs) -> Result<(), Box<dyn Error>> {
    let store = open_store(global)?;
    let record = store.latest(&args.tag)?;
    let document = store.info(&record.fingerprint)?;
    println!("{}", to_pretty_json_string(&document)?);
    Ok(())
}
