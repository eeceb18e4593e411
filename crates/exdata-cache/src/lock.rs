//! # Lock Sentinel — Cross-Process Write Exclusion
//!
//! The only writer-coordination primitive for the shared cache directory
//! is a sentinel file next to the entry (`<entry>.lock`). It is acquired
//! with an atomic exclusive create — never check-then-create, which
//! leaves a race window between the existence test and the creation —
//! and released by deleting the file on every exit path via `Drop`.
//!
//! A killed writer leaves a stale sentinel behind; waiters time out with
//! a diagnostic naming the path so an operator can remove it.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::CacheError;

/// Polling policy for readers waiting on a held lock.
#[derive(Debug, Clone, Copy)]
pub struct LockWait {
    /// Total wait budget before failing with `LockTimeout`.
    pub timeout: Duration,
    /// Poll interval while the sentinel exists.
    pub poll: Duration,
    /// Grace period before the one-time warning is emitted.
    pub warn_after: Duration,
}

impl Default for LockWait {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll: Duration::from_millis(10),
            warn_after: Duration::from_secs(2),
        }
    }
}

/// The sentinel path for a cache entry.
pub fn sentinel_path(entry: &Path) -> PathBuf {
    let mut os = entry.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}

/// An exclusive write lock on one cache entry, released on drop.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
}

impl CacheLock {
    /// Acquire the lock for `entry` via atomic exclusive create.
    ///
    /// Fails with [`CacheError::LockBusy`] if the sentinel already
    /// exists. Callers that want to wait instead should poll with
    /// [`wait_until_free`] and retry.
    pub fn acquire(entry: &Path) -> Result<Self, CacheError> {
        let path = sentinel_path(entry);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(CacheError::LockBusy { lock_path: path })
            }
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    /// The sentinel file this lock holds.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        // Failing to delete the sentinel only delays other waiters until
        // their timeout; nothing more can be done from a destructor.
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), %err, "failed to release lock sentinel");
        }
    }
}

/// Block until no sentinel exists for `entry`, polling per `wait`.
///
/// Emits a one-time warning after the grace period and fails with
/// [`CacheError::LockTimeout`] when the budget is exhausted.
pub fn wait_until_free(entry: &Path, wait: &LockWait) -> Result<(), CacheError> {
    let lock = sentinel_path(entry);
    if !lock.is_file() {
        return Ok(());
    }
    let start = Instant::now();
    let mut warned = false;
    while lock.is_file() {
        std::thread::sleep(wait.poll);
        let elapsed = start.elapsed();
        if elapsed > wait.timeout {
            return Err(CacheError::LockTimeout {
                lock_path: lock,
                waited_secs: wait.timeout.as_secs(),
            });
        }
        if elapsed > wait.warn_after && !warned {
            warn!(
                lock = %lock.display(),
                budget_secs = wait.timeout.as_secs(),
                "waiting on lock sentinel; if this persists, consider removing it"
            );
            warned = true;
        }
    }
    Ok(())
}
