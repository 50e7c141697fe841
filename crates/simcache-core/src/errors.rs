//! Structured error types shared across simcache crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`SimError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (fingerprints, paths, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for simcache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum SimError {
    /// A fingerprint facet could not be canonicalized.
    #[error("unhashable input: {0}")]
    UnhashableInput(ErrorInfo),
    /// A different record already exists under the same fingerprint.
    #[error("duplicate run: {0}")]
    DuplicateRun(ErrorInfo),
    /// No record exists for the requested identifier.
    #[error("run not found: {0}")]
    RunNotFound(ErrorInfo),
    /// The user computation returned something other than named arrays.
    #[error("invalid result shape: {0}")]
    InvalidResultShape(ErrorInfo),
    /// Staging or commit of a record was interrupted.
    #[error("partial write: {0}")]
    PartialWrite(ErrorInfo),
    /// Export destination format is not supported.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(ErrorInfo),
    /// The user computation itself failed.
    #[error("computation failed: {0}")]
    Computation(ErrorInfo),
    /// The run index could not be read or updated.
    #[error("index error: {0}")]
    Index(ErrorInfo),
    /// Filesystem failures outside the commit protocol.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Invalid configuration or grid documents.
    #[error("config error: {0}")]
    Config(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl SimError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            SimError::UnhashableInput(info)
            | SimError::DuplicateRun(info)
            | SimError::RunNotFound(info)
            | SimError::InvalidResultShape(info)
            | SimError::PartialWrite(info)
            | SimError::UnsupportedFormat(info)
            | SimError::Computation(info)
            | SimError::Index(info)
            | SimError::Io(info)
            | SimError::Serde(info)
            | SimError::Config(info) => info,
        }
    }

    /// Returns true when the failure concerns the store as a whole rather
    /// than a single run. Sweeps abort on these and isolate everything else.
    pub fn is_structural(&self) -> bool {
        matches!(self, SimError::Index(_))
    }

    /// Wraps an I/O failure, recording the path it concerned.
    pub fn io(code: &str, path: &std::path::Path, err: impl ToString) -> Self {
        SimError::Io(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    }
}
