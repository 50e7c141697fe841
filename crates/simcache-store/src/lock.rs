use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;

use fs4::FileExt;
use simcache_core::errors::{ErrorInfo, SimError};
use simcache_fp::Fingerprint;
use tracing::trace;

use crate::layout::StoreLayout;

/// Exclusive, fingerprint-scoped lock held across the staging-to-commit
/// transition. Released when dropped, including on early returns and
/// unwinding.
///
/// Lock files are never deleted: removing one while another process waits on
/// it would let two writers hold "the" lock at once.
#[derive(Debug)]
pub(crate) struct FingerprintLock {
    file: File,
    fingerprint: Fingerprint,
}

impl FingerprintLock {
    /// Blocks until the lock for `fp` is held.
    pub(crate) fn acquire(layout: &StoreLayout, fp: &Fingerprint) -> Result<Self, SimError> {
        let file = open_lock_file(layout, fp)?;
        file.lock_exclusive().map_err(|err| lock_error(fp, err))?;
        trace!(fingerprint = %fp.short(), "acquired fingerprint lock");
        Ok(Self {
            file,
            fingerprint: fp.clone(),
        })
    }

    /// Takes the lock only if nobody else holds it.
    pub(crate) fn try_acquire(
        layout: &StoreLayout,
        fp: &Fingerprint,
    ) -> Result<Option<Self>, SimError> {
        let file = open_lock_file(layout, fp)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                fingerprint: fp.clone(),
            })),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(lock_error(fp, err)),
        }
    }
}

impl Drop for FingerprintLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(fingerprint = %self.fingerprint.short(), %err, "failed to release fingerprint lock");
        }
    }
}

fn open_lock_file(layout: &StoreLayout, fp: &Fingerprint) -> Result<File, SimError> {
    let dir = layout.locks_dir();
    fs::create_dir_all(&dir).map_err(|err| SimError::io("store.lock_dir", &dir, err))?;
    let path = layout.lock_path(fp);
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .map_err(|err| SimError::io("store.lock_open", &path, err))
}

fn lock_error(fp: &Fingerprint, err: std::io::Error) -> SimError {
    SimError::Io(
        ErrorInfo::new("store.lock", err.to_string())
            .with_context("fingerprint", fp.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        let fp = Fingerprint::parse(&"ab".repeat(32)).unwrap();
        let held = FingerprintLock::acquire(&layout, &fp).unwrap();
        assert!(FingerprintLock::try_acquire(&layout, &fp).unwrap().is_none());
        drop(held);
        assert!(FingerprintLock::try_acquire(&layout, &fp).unwrap().is_some());
    }

    #[test]
    fn distinct_fingerprints_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        let a = Fingerprint::parse(&"aa".repeat(32)).unwrap();
        let b = Fingerprint::parse(&"bb".repeat(32)).unwrap();
        let _held = FingerprintLock::acquire(&layout, &a).unwrap();
        assert!(FingerprintLock::try_acquire(&layout, &b).unwrap().is_some());
    }
}
