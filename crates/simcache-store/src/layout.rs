use std::path::{Path, PathBuf};

use simcache_fp::Fingerprint;

pub(crate) const RUNS_DIR: &str = "runs";
pub(crate) const STAGING_DIR: &str = "staging";
pub(crate) const LOCKS_DIR: &str = "locks";
pub(crate) const INDEX_FILE: &str = "index.sqlite";
pub(crate) const RECORD_FILE: &str = "record.json";
pub(crate) const ARRAYS_FILE: &str = "arrays.bin";
const STAGING_SUFFIX: &str = ".partial";

/// Resolves every path the store touches under its root.
#[derive(Debug, Clone)]
pub(crate) struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn runs_dir(&self) -> PathBuf {
        self.root.join(RUNS_DIR)
    }

    pub(crate) fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub(crate) fn locks_dir(&self) -> PathBuf {
        self.root.join(LOCKS_DIR)
    }

    pub(crate) fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// Location of a unit relative to the root, as recorded in the index.
    pub(crate) fn unit_location(&self, fp: &Fingerprint) -> String {
        format!("{RUNS_DIR}/{}/{}", fp.shard(), fp.as_str())
    }

    pub(crate) fn unit_dir(&self, fp: &Fingerprint) -> PathBuf {
        self.runs_dir().join(fp.shard()).join(fp.as_str())
    }

    pub(crate) fn staging_dir(&self, fp: &Fingerprint) -> PathBuf {
        self.staging_root()
            .join(format!("{}{STAGING_SUFFIX}", fp.as_str()))
    }

    pub(crate) fn lock_path(&self, fp: &Fingerprint) -> PathBuf {
        self.locks_dir().join(format!("{}.lock", fp.as_str()))
    }

    /// Recovers the fingerprint a staging directory belongs to.
    pub(crate) fn staged_fingerprint(path: &Path) -> Option<Fingerprint> {
        let name = path.file_name()?.to_str()?;
        Fingerprint::parse(name.strip_suffix(STAGING_SUFFIX)?).ok()
    }
}
