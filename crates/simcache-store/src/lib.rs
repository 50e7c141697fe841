//! Durable run store keyed by fingerprint.
//!
//! Each run is one directory under `runs/` holding a JSON record document
//! and a bincode array payload. Units are assembled in `staging/` under a
//! per-fingerprint file lock and committed with a single rename, after which
//! the SQLite index gains a row. The index therefore never points at a
//! partial unit, and it can always be rebuilt by scanning `runs/`.

mod doctor;
mod export;
mod index;
mod layout;
mod lock;
pub mod record;
mod store;

pub use doctor::StoreCheck;
pub use export::ExportFormat;
pub use index::ListFilter;
pub use record::{
    normalize_tags, now_timestamp, ArrayManifest, Metadata, RecordDocument, RunFacets, RunRecord,
    RunSummary, RECORD_SCHEMA_VERSION,
};
pub use store::{PutOutcome, RunStore, MIN_PREFIX_LEN};
