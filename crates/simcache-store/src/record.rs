use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use simcache_core::array::NamedArrays;
use simcache_core::errors::{ErrorInfo, SimError};
use simcache_core::params::Params;
use simcache_fp::{sha256_hex, stable_hash_string, CodeVersion, Environment, Fingerprint};

/// Schema version written into every `record.json`.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// Free-form metadata attached to a run.
pub type Metadata = Map<String, Value>;

/// The four inputs a fingerprint is derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFacets {
    pub code_version: CodeVersion,
    pub params: Params,
    pub seed: u64,
    pub environment: Environment,
}

/// One persisted run: facets, arrays and labels, keyed by fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub fingerprint: Fingerprint,
    pub facets: RunFacets,
    pub arrays: NamedArrays,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Presentation settings for plotting the run; a label, not content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_config: Option<Value>,
    pub created_at: String,
}

impl RunRecord {
    /// Builds a record stamped with the current UTC time.
    pub fn new(
        fingerprint: Fingerprint,
        facets: RunFacets,
        arrays: NamedArrays,
        metadata: Metadata,
        tags: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            fingerprint,
            facets,
            arrays,
            metadata,
            tags: normalize_tags(tags),
            plot_config: None,
            created_at: now_timestamp(),
        }
    }

    pub fn with_plot_config(mut self, plot_config: Option<Value>) -> Self {
        self.plot_config = plot_config;
        self
    }

    /// Digest of everything that must agree between two writers of the same
    /// fingerprint. Creation time, tags and plot configuration are labels,
    /// not content.
    pub fn content_digest(&self) -> Result<String, SimError> {
        content_digest(&self.fingerprint, &self.facets, &self.metadata, &self.arrays)
    }

    /// Summary used by listings.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            fingerprint: self.fingerprint.clone(),
            created_at: self.created_at.clone(),
            tags: self.tags.clone(),
            code_version: self.facets.code_version.to_string(),
            seed: self.facets.seed,
        }
    }
}

/// Shape entry in the array manifest of a record document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayManifest {
    pub shape: Vec<usize>,
    pub len: usize,
}

/// Metadata document stored as `record.json` next to the array payload.
///
/// Reading it never touches bulk array data, so `info` and index rebuilds
/// stay cheap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDocument {
    pub schema_version: u32,
    pub fingerprint: Fingerprint,
    pub facets: RunFacets,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_config: Option<Value>,
    pub created_at: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub arrays: BTreeMap<String, ArrayManifest>,
    pub arrays_file: String,
    pub content_digest: String,
}

impl RecordDocument {
    pub(crate) fn describe(record: &RunRecord, arrays_file: &str, digest: String) -> Self {
        let arrays = record
            .arrays
            .iter()
            .map(|(name, array)| {
                (
                    name.clone(),
                    ArrayManifest {
                        shape: array.shape.clone(),
                        len: array.len(),
                    },
                )
            })
            .collect();
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            fingerprint: record.fingerprint.clone(),
            facets: record.facets.clone(),
            tags: record.tags.clone(),
            plot_config: record.plot_config.clone(),
            created_at: record.created_at.clone(),
            metadata: record.metadata.clone(),
            arrays,
            arrays_file: arrays_file.to_string(),
            content_digest: digest,
        }
    }

    /// Reassembles the full record once the arrays have been loaded.
    pub(crate) fn into_record(self, arrays: NamedArrays) -> Result<RunRecord, SimError> {
        let names_match = arrays.len() == self.arrays.len()
            && arrays.iter().all(|(name, array)| {
                self.arrays
                    .get(name)
                    .map(|manifest| manifest.shape == array.shape)
                    .unwrap_or(false)
            });
        if !names_match {
            return Err(SimError::PartialWrite(
                ErrorInfo::new(
                    "store.arrays_mismatch",
                    "array payload does not match the record manifest",
                )
                .with_context("fingerprint", self.fingerprint.to_string())
                .with_hint("run `simcache doctor --repair` and recompute the run"),
            ));
        }
        Ok(RunRecord {
            fingerprint: self.fingerprint,
            facets: self.facets,
            arrays,
            metadata: self.metadata,
            tags: self.tags,
            plot_config: self.plot_config,
            created_at: self.created_at,
        })
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            fingerprint: self.fingerprint.clone(),
            created_at: self.created_at.clone(),
            tags: self.tags.clone(),
            code_version: self.facets.code_version.to_string(),
            seed: self.facets.seed,
        }
    }
}

/// Row returned by `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub fingerprint: Fingerprint,
    pub created_at: String,
    pub tags: Vec<String>,
    pub code_version: String,
    pub seed: u64,
}

pub(crate) fn content_digest(
    fingerprint: &Fingerprint,
    facets: &RunFacets,
    metadata: &Metadata,
    arrays: &NamedArrays,
) -> Result<String, SimError> {
    let payload = bincode::serialize(arrays).map_err(|err| {
        SimError::Serde(ErrorInfo::new("store.arrays_encode", err.to_string()))
    })?;
    let arrays_digest = sha256_hex(&payload);
    stable_hash_string(&(fingerprint, facets, metadata, arrays_digest))
}

/// Sorted, de-duplicated, non-empty tags.
pub fn normalize_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// RFC 3339 UTC timestamp with fixed microsecond precision, so timestamps
/// order correctly as plain strings.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
