use std::collections::BTreeSet;
use std::fs;

use serde::Serialize;
use simcache_core::errors::SimError;
use tracing::{info, warn};

use crate::layout::StoreLayout;
use crate::lock::FingerprintLock;
use crate::store::RunStore;

/// Consistency report between the index and the units on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreCheck {
    pub status: String,
    pub index_schema: Option<i64>,
    pub indexed: usize,
    pub units: usize,
    /// Units on disk with no index row.
    pub unindexed: Vec<String>,
    /// Index rows whose unit is gone.
    pub dangling: Vec<String>,
    /// Units whose record document cannot be read.
    pub damaged: Vec<String>,
    pub stale_staging: Vec<String>,
}

impl StoreCheck {
    pub fn is_healthy(&self) -> bool {
        self.unindexed.is_empty()
            && self.dangling.is_empty()
            && self.damaged.is_empty()
            && self.stale_staging.is_empty()
    }
}

impl RunStore {
    /// Compares the index against the units on disk. Read-only.
    pub fn check(&self) -> Result<StoreCheck, SimError> {
        let scan = self.scan_units()?;
        let on_disk: BTreeSet<String> = scan
            .readable
            .iter()
            .map(|doc| doc.fingerprint.to_string())
            .collect();
        let indexed: BTreeSet<String> = self.index().all_fingerprints()?.into_iter().collect();
        let stale_staging = self
            .stale_staging()?
            .iter()
            .filter_map(|path| path.file_name().map(|name| name.to_string_lossy().to_string()))
            .collect();
        let mut check = StoreCheck {
            status: String::new(),
            index_schema: self.index().schema_version()?,
            indexed: indexed.len(),
            units: on_disk.len(),
            unindexed: on_disk.difference(&indexed).cloned().collect(),
            dangling: indexed.difference(&on_disk).cloned().collect(),
            damaged: scan.damaged.iter().map(ToString::to_string).collect(),
            stale_staging,
        };
        check.status = if check.is_healthy() {
            "ok".into()
        } else {
            "needs-attention".into()
        };
        Ok(check)
    }

    /// Removes stale staging and damaged units, then rebuilds the index.
    /// Returns the report taken afterwards.
    pub fn repair(&self) -> Result<StoreCheck, SimError> {
        for path in self.stale_staging()? {
            match StoreLayout::staged_fingerprint(&path) {
                Some(fp) => {
                    let Some(_lock) = FingerprintLock::try_acquire(self.layout(), &fp)? else {
                        continue;
                    };
                    remove_path(&path)?;
                }
                None => remove_path(&path)?,
            }
            warn!(path = %path.display(), "removed stale staging");
        }
        for fp in self.scan_units()?.damaged {
            let Some(_lock) = FingerprintLock::try_acquire(self.layout(), &fp)? else {
                continue;
            };
            let unit = self.layout().unit_dir(&fp);
            fs::remove_dir_all(&unit).map_err(|err| SimError::io("store.remove_unit", &unit, err))?;
            warn!(fingerprint = %fp.short(), "removed damaged unit");
        }
        let runs = self.rebuild_index()?;
        info!(runs, "store repaired");
        self.check()
    }
}

fn remove_path(path: &std::path::Path) -> Result<(), SimError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|err| SimError::io("store.remove_staging", path, err))
}
