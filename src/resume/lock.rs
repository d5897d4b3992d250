//! Advisory lock on a destination directory
//!
//! Two processes mirroring into the same destination would race on the same
//! staging files. The lock file `{root}/bybit_data/.lock` is held with
//! fd-lock for the whole run.

use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::downloader::config::LOCAL_NAMESPACE;

/// Name of the lock file inside the local namespace
pub const LOCK_FILE_NAME: &str = ".lock";

/// Lock errors
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Lock file could not be created
    #[error("IO error: {0}")]
    IoError(String),

    /// Another process holds the lock
    #[error("destination is locked by another run: {0}")]
    Held(String),
}

/// Lock file of one destination
pub struct RunLock {
    path: PathBuf,
    lock: RwLock<File>,
}

impl RunLock {
    /// Open (creating if needed) the lock file below `root_dir`
    pub fn open(root_dir: &Path) -> Result<Self, LockError> {
        let dir = root_dir.join(LOCAL_NAMESPACE);
        std::fs::create_dir_all(&dir).map_err(|e| {
            LockError::IoError(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LockError::IoError(format!("Failed to open {}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive lock without blocking.
    ///
    /// The lock is released when the guard is dropped.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>, LockError> {
        let path = self.path.display().to_string();
        self.lock
            .try_write()
            .map_err(|e| LockError::Held(format!("{path}: {e}")))
    }
}
