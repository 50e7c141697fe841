use std::error::Error;

use clap::Args;
use simcache_store::ListFilter;

use super::{open_store, GlobalOpts};

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Only runs carrying this tag.
    #[arg(long)]
    pub tag: Option<String>,
    /// Maximum number of runs to print.
    #[arg(long)]
    pub limit: Option<usize>,
}

pub fn run(global: &GlobalOpts, args: &LsArgs) -> Result<(), Box<dyn Error>> {
    let store = open_store(global)?;
    let filter = ListFilter {
        tag: args.tag.clone(),
        limit: args.limit,
    };
    for summary in store.list(&filter)? {
        let mut line = format!("{} {}", summary.fingerprint, summary.created_at);
        if !summary.tags.is_empty() {
            line.push_str(&format!(" [{}]", summary.tags.join(",")));
        }
        println!("{line}");
    }
    Ok(())
}
