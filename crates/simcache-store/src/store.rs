use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use simcache_core::errors::{ErrorInfo, SimError};
use simcache_core::serde::{from_json_slice, to_pretty_json_string};
use simcache_fp::Fingerprint;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::export::{decode_arrays, encode_arrays, write_export, ExportFormat};
use crate::index::{is_corruption, ListFilter, RunIndex};
use crate::layout::{StoreLayout, ARRAYS_FILE, RECORD_FILE};
use crate::lock::FingerprintLock;
use crate::record::{RecordDocument, RunRecord, RunSummary};

/// Shortest prefix accepted by [`RunStore::resolve`].
pub const MIN_PREFIX_LEN: usize = 8;

const CORRUPT_SUFFIX: &str = "corrupt";

/// Result of a successful [`RunStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The record was written and indexed by this call.
    Committed,
    /// An identical record was already committed; nothing was written.
    AlreadyPresent,
}

/// Handle on one store directory.
///
/// Handles are cheap to clone and hold no open files between calls, so any
/// number of threads or processes may share a root.
#[derive(Debug, Clone)]
pub struct RunStore {
    layout: StoreLayout,
    index: RunIndex,
}

fn not_found(fp: &str) -> SimError {
    SimError::RunNotFound(
        ErrorInfo::new("store.not_found", "no run with this id").with_context("run_id", fp),
    )
}

fn partial_write(fp: &Fingerprint, cause: SimError) -> SimError {
    let info = cause.info();
    SimError::PartialWrite(
        ErrorInfo::new("store.partial_write", info.message.clone())
            .with_context("fingerprint", fp.to_string())
            .with_context("cause", info.code.clone()),
    )
}

impl RunStore {
    /// Opens (creating if needed) the store rooted at `root`.
    ///
    /// An index SQLite cannot read is moved aside and rebuilt from the units
    /// on disk.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SimError> {
        let layout = StoreLayout::new(root);
        for dir in [
            layout.root().to_path_buf(),
            layout.runs_dir(),
            layout.staging_root(),
            layout.locks_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|err| SimError::io("store.create_dir", &dir, err))?;
        }
        let index_path = layout.index_path();
        let fresh = !index_path.exists();
        let index = RunIndex::new(&index_path);
        let mut needs_rebuild = fresh;
        match index.init() {
            Ok(()) => {}
            Err(err) if is_corruption(&err) => {
                warn!(path = %index_path.display(), %err, "index unreadable, rebuilding from units");
                quarantine_index(&index_path)?;
                index.init().map_err(|err| {
                    SimError::Index(ErrorInfo::new("store.index_init", err.to_string()))
                })?;
                needs_rebuild = true;
            }
            Err(err) => {
                return Err(SimError::Index(
                    ErrorInfo::new("store.index_init", err.to_string())
                        .with_context("path", index_path.display().to_string()),
                ))
            }
        }
        let store = Self { layout, index };
        if needs_rebuild && store.has_units() {
            store.rebuild_index()?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Index lookup plus a stat of the record document; bulk arrays are
    /// never read.
    pub fn exists(&self, fp: &Fingerprint) -> Result<bool, SimError> {
        Ok(self.index.location(fp)?.is_some() && self.record_path(fp).is_file())
    }

    /// Commits `record` under its fingerprint.
    ///
    /// Writers of the same fingerprint are serialized by a file lock. A
    /// second writer with identical content gets [`PutOutcome::AlreadyPresent`];
    /// differing content is [`SimError::DuplicateRun`] and the committed
    /// record is left untouched.
    pub fn put(&self, record: &RunRecord) -> Result<PutOutcome, SimError> {
        let fp = &record.fingerprint;
        let digest = record.content_digest()?;
        let _lock = FingerprintLock::acquire(&self.layout, fp)?;

        let unit = self.layout.unit_dir(fp);
        if self.record_path(fp).is_file() {
            let existing = self.info(fp)?;
            if existing.content_digest != digest {
                return Err(SimError::DuplicateRun(
                    ErrorInfo::new(
                        "store.duplicate_run",
                        "a different record is already committed under this fingerprint",
                    )
                    .with_context("fingerprint", fp.to_string())
                    .with_context("existing_digest", existing.content_digest.clone())
                    .with_context("new_digest", digest)
                    .with_hint("the computation is not deterministic for these inputs"),
                ));
            }
            if self.index.location(fp)?.is_none() {
                self.index
                    .insert(&existing.summary(), &self.layout.unit_location(fp))?;
                info!(fingerprint = %fp.short(), "restored missing index row");
            }
            debug!(fingerprint = %fp.short(), "identical record already committed");
            return Ok(PutOutcome::AlreadyPresent);
        }
        if unit.exists() {
            warn!(fingerprint = %fp.short(), "removing unit without a record document");
            fs::remove_dir_all(&unit).map_err(|err| SimError::io("store.remove_unit", &unit, err))?;
        }

        let staging = self.layout.staging_dir(fp);
        if staging.exists() {
            warn!(fingerprint = %fp.short(), "discarding staging left by an interrupted writer");
            fs::remove_dir_all(&staging)
                .map_err(|err| partial_write(fp, SimError::io("store.stale_staging", &staging, err)))?;
        }
        if let Err(err) = self.commit_staged(record, digest, &staging, &unit) {
            if staging.exists() {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    warn!(fingerprint = %fp.short(), %cleanup, "could not clean staging");
                }
            }
            return Err(partial_write(fp, err));
        }

        self.index
            .insert(&record.summary(), &self.layout.unit_location(fp))?;
        info!(fingerprint = %fp.short(), arrays = record.arrays.len(), "committed run");
        Ok(PutOutcome::Committed)
    }

    fn commit_staged(
        &self,
        record: &RunRecord,
        digest: String,
        staging: &Path,
        unit: &Path,
    ) -> Result<(), SimError> {
        fs::create_dir_all(staging)
            .map_err(|err| SimError::io("store.stage_dir", staging, err))?;
        write_synced(&staging.join(ARRAYS_FILE), &encode_arrays(&record.arrays)?)?;
        let document = RecordDocument::describe(record, ARRAYS_FILE, digest);
        write_synced(
            &staging.join(RECORD_FILE),
            to_pretty_json_string(&document)?.as_bytes(),
        )?;
        sync_dir(staging);

        let shard = unit
            .parent()
            .ok_or_else(|| SimError::io("store.unit_parent", unit, "unit has no parent"))?;
        fs::create_dir_all(shard).map_err(|err| SimError::io("store.shard_dir", shard, err))?;
        fs::rename(staging, unit).map_err(|err| SimError::io("store.commit", unit, err))?;
        sync_dir(shard);
        Ok(())
    }

    /// Loads the full record including arrays.
    pub fn get(&self, fp: &Fingerprint) -> Result<RunRecord, SimError> {
        let document = self.info(fp)?;
        let arrays_path = self.layout.unit_dir(fp).join(&document.arrays_file);
        let bytes = fs::read(&arrays_path).map_err(|err| {
            SimError::PartialWrite(
                ErrorInfo::new("store.arrays_missing", err.to_string())
                    .with_context("fingerprint", fp.to_string())
                    .with_hint("run `simcache doctor --repair`"),
            )
        })?;
        document.into_record(decode_arrays(&bytes)?)
    }

    /// Loads the record document without touching array data.
    pub fn info(&self, fp: &Fingerprint) -> Result<RecordDocument, SimError> {
        let path = self.record_path(fp);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(not_found(fp.as_str()))
            }
            Err(err) => return Err(SimError::io("store.read_record", &path, err)),
        };
        from_json_slice(&bytes)
    }

    /// Summaries ordered newest first.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<RunSummary>, SimError> {
        self.index.list(filter)
    }

    /// Newest record carrying `tag`.
    pub fn latest(&self, tag: &str) -> Result<RunRecord, SimError> {
        let filter = ListFilter {
            tag: Some(tag.to_string()),
            limit: Some(1),
        };
        let summary = self.list(&filter)?.into_iter().next().ok_or_else(|| {
            SimError::RunNotFound(
                ErrorInfo::new("store.no_tagged_run", "no run carries this tag")
                    .with_context("tag", tag),
            )
        })?;
        self.get(&summary.fingerprint)
    }

    /// Resolves a full run id or a unique prefix of at least
    /// [`MIN_PREFIX_LEN`] characters.
    pub fn resolve(&self, run_id: &str) -> Result<Fingerprint, SimError> {
        let text = run_id.trim().to_ascii_lowercase();
        if !text.bytes().all(|byte| byte.is_ascii_hexdigit()) || text.is_empty() {
            return Err(not_found(run_id));
        }
        if let Ok(fp) = Fingerprint::parse(&text) {
            return if self.exists(&fp)? {
                Ok(fp)
            } else {
                Err(not_found(run_id))
            };
        }
        if text.len() < MIN_PREFIX_LEN {
            return Err(SimError::RunNotFound(
                ErrorInfo::new("store.prefix_too_short", "run id prefix is too short")
                    .with_context("run_id", run_id)
                    .with_hint(format!("give at least {MIN_PREFIX_LEN} characters")),
            ));
        }
        let mut matches = self.index.with_prefix(&text, 2)?;
        match matches.len() {
            0 => Err(not_found(run_id)),
            1 => Fingerprint::parse(&matches.remove(0)),
            _ => Err(SimError::RunNotFound(
                ErrorInfo::new("store.ambiguous_prefix", "run id prefix matches several runs")
                    .with_context("run_id", run_id)
                    .with_hint("give more characters of the run id"),
            )),
        }
    }

    /// Writes the arrays of `fp` to `dest`. Without an explicit format the
    /// destination extension decides. A missing run is reported before any
    /// format check or filesystem effect.
    pub fn export(
        &self,
        fp: &Fingerprint,
        dest: &Path,
        format: Option<ExportFormat>,
    ) -> Result<ExportFormat, SimError> {
        if !self.record_path(fp).is_file() {
            return Err(not_found(fp.as_str()));
        }
        let format = match format {
            Some(format) => format,
            None => ExportFormat::from_path(dest)?,
        };
        let record = self.get(fp)?;
        write_export(&record, format, dest)?;
        info!(fingerprint = %fp.short(), format = format.name(), dest = %dest.display(), "exported run");
        Ok(format)
    }

    /// Repopulates the index from the units on disk. Returns the number of
    /// indexed runs.
    pub fn rebuild_index(&self) -> Result<usize, SimError> {
        let scan = self.scan_units()?;
        let rows: Vec<(RunSummary, String)> = scan
            .readable
            .iter()
            .map(|doc| (doc.summary(), self.layout.unit_location(&doc.fingerprint)))
            .collect();
        self.index.replace_all(&rows)?;
        info!(runs = rows.len(), damaged = scan.damaged.len(), "rebuilt index");
        Ok(rows.len())
    }

    pub(crate) fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub(crate) fn index(&self) -> &RunIndex {
        &self.index
    }

    fn record_path(&self, fp: &Fingerprint) -> PathBuf {
        self.layout.unit_dir(fp).join(RECORD_FILE)
    }

    fn has_units(&self) -> bool {
        WalkDir::new(self.layout.runs_dir())
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(Result::ok)
            .any(|entry| entry.file_type().is_dir())
    }

    /// Reads every unit document under `runs/`.
    pub(crate) fn scan_units(&self) -> Result<UnitScan, SimError> {
        let mut scan = UnitScan::default();
        let runs = self.layout.runs_dir();
        for entry in WalkDir::new(&runs).min_depth(2).max_depth(2).sort_by_file_name() {
            let entry = entry.map_err(|err| SimError::io("store.scan", &runs, err))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(fp) = Fingerprint::parse(&name) else {
                warn!(path = %entry.path().display(), "ignoring foreign directory under runs/");
                continue;
            };
            match self.info(&fp) {
                Ok(doc) if doc.fingerprint == fp => scan.readable.push(doc),
                Ok(_) => {
                    warn!(fingerprint = %fp.short(), "record fingerprint does not match its directory");
                    scan.damaged.push(fp);
                }
                Err(err) => {
                    warn!(fingerprint = %fp.short(), %err, "unreadable unit");
                    scan.damaged.push(fp);
                }
            }
        }
        Ok(scan)
    }

    /// Staging directories whose writer is gone.
    pub(crate) fn stale_staging(&self) -> Result<Vec<PathBuf>, SimError> {
        let root = self.layout.staging_root();
        let mut stale = Vec::new();
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(stale),
            Err(err) => return Err(SimError::io("store.scan_staging", &root, err)),
        };
        for entry in entries {
            let path = entry
                .map_err(|err| SimError::io("store.scan_staging", &root, err))?
                .path();
            match StoreLayout::staged_fingerprint(&path) {
                Some(fp) => {
                    // A held lock means a writer is mid-commit.
                    if FingerprintLock::try_acquire(&self.layout, &fp)?.is_some() {
                        stale.push(path);
                    }
                }
                None => stale.push(path),
            }
        }
        stale.sort();
        Ok(stale)
    }
}

#[derive(Debug, Default)]
pub(crate) struct UnitScan {
    pub(crate) readable: Vec<RecordDocument>,
    pub(crate) damaged: Vec<Fingerprint>,
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), SimError> {
    let mut file = File::create(path).map_err(|err| SimError::io("store.write", path, err))?;
    file.write_all(bytes)
        .map_err(|err| SimError::io("store.write", path, err))?;
    file.sync_all()
        .map_err(|err| SimError::io("store.fsync", path, err))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(err) = File::open(dir).and_then(|handle| handle.sync_all()) {
        debug!(path = %dir.display(), %err, "directory fsync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

fn quarantine_index(index_path: &Path) -> Result<(), SimError> {
    let mut aside = index_path.as_os_str().to_owned();
    aside.push(".");
    aside.push(CORRUPT_SUFFIX);
    let aside = PathBuf::from(aside);
    fs::rename(index_path, &aside)
        .map_err(|err| SimError::io("store.index_quarantine", index_path, err))?;
    for suffix in ["-wal", "-shm"] {
        let mut side = index_path.as_os_str().to_owned();
        side.push(suffix);
        let side = PathBuf::from(side);
        if side.exists() {
            fs::remove_file(&side)
                .map_err(|err| SimError::io("store.index_quarantine", &side, err))?;
        }
    }
    Ok(())
}
