use std::error::Error;

use clap::Args;
use simcache_core::serde::to_pretty_json_string;

use super::{open_store, GlobalOpts};

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Full run id or a unique prefix of at least 8 characters.
    pub run_id: String,
}

pub fn run(global: &GlobalOpts, args: &InfoArgs) -> Result<(), Box<dyn Error>> {
    let store = open_store(global)?;
    let fingerprint = store.resolve(&args.run_id)?;
    let document = store.info(&fingerprint)?;
    println!("{}", to_pretty_json_string(&document)?);
    Ok(())
}
