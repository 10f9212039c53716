//! Directory lock
//!
//! Cross-platform (fs2) advisory lock enforcing one open database per
//! directory. The lock file is `<root>/LOCK`; the lock is released on drop.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Result, StoreError};

const LOCK_FILENAME: &str = "LOCK";

/// Held exclusive lock on a database directory
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Take the lock without blocking; fails with `Locked` if it is held
    pub fn acquire(root: &Path) -> Result<Self> {
        let path = root.join(LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        file.try_lock_exclusive().map_err(|e| {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                StoreError::Locked(root.display().to_string())
            } else {
                StoreError::Io(e)
            }
        })?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        // Unlock errors on drop are ignored; closing the file releases it anyway.
        let _ = self.file.unlock();
    }
}
