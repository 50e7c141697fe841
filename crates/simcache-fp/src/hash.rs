use serde::Serialize;
use sha2::{Digest, Sha256};
use simcache_core::errors::SimError;
use simcache_core::serde::to_canonical_json_bytes;

/// Domain separation prefix for fingerprint digests.
pub const FINGERPRINT_DOMAIN: &[u8] = b"simcache.fingerprint.v1";

/// Incremental digest over tagged, length-prefixed frames.
///
/// Each frame is `tag | u64 big-endian length | bytes`, so no two distinct
/// sequences of frames produce the same byte stream.
pub(crate) struct FramedHasher {
    inner: Sha256,
}

impl FramedHasher {
    pub(crate) fn new(domain: &[u8]) -> Self {
        let mut inner = Sha256::new();
        inner.update(domain);
        Self { inner }
    }

    pub(crate) fn frame(&mut self, tag: u8, bytes: &[u8]) {
        self.inner.update([tag]);
        self.inner.update((bytes.len() as u64).to_be_bytes());
        self.inner.update(bytes);
    }

    pub(crate) fn finish_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Computes a stable hexadecimal hash for the provided serializable payload.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, SimError> {
    let bytes = to_canonical_json_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// Hex-encoded SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
