use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use simcache_core::errors::{ErrorInfo, SimError};

use crate::env::TOOL_VERSION;

/// Stable token naming the implementation of a computation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeVersion(String);

impl CodeVersion {
    /// Wraps an explicit token such as a commit id.
    pub fn new(token: impl Into<String>) -> Result<Self, SimError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SimError::UnhashableInput(ErrorInfo::new(
                "fingerprint.code_version",
                "code version token is empty",
            )));
        }
        Ok(Self(token))
    }

    /// Content hash of a script or source file: `sha256:<hex>`.
    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        let bytes = fs::read(path).map_err(|err| SimError::io("fingerprint.code_read", path, err))?;
        Ok(Self::from_source_bytes(&bytes))
    }

    /// Content hash of in-memory source text.
    pub fn from_source_bytes(bytes: &[u8]) -> Self {
        Self(format!("sha256:{}", hex::encode(Sha256::digest(bytes))))
    }

    /// Token for a computation compiled into simcache itself.
    pub fn builtin(name: &str) -> Self {
        Self(format!("builtin:{name}@{TOOL_VERSION}"))
    }

    /// Returns the token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
