//! # exdata-cache — Shared Local Artifact Cache
//!
//! A content-addressed cache directory shared by every project on a
//! machine, safe for concurrent use by multiple processes:
//!
//! - [`lock`] — the `<entry>.lock` sentinel: atomic exclusive-create
//!   acquisition, drop-based release, and the polling wait loop.
//! - [`store`] — the `CacheStore` itself: hash-sharded layout, the
//!   miss/hit/self-heal state machine, and materialization by copy or
//!   symlink.
//!
//! ## Crate Policy
//!
//! - Cache entries are immutable once promoted (read-only on disk);
//!   every mutation is delete-then-repopulate under the lock sentinel.
//! - Losing a lock race is not an error for `get`: the loser waits for
//!   the winner and serves the completed entry.

pub mod lock;
pub mod store;

use std::path::PathBuf;

use exdata_core::{DigestError, HashRef, TransferError};

pub use lock::{sentinel_path, wait_until_free, CacheLock, LockWait};
pub use store::{CacheStore, GetOptions, Outcome};

/// Errors from cache locking and retrieval.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The lock sentinel already exists; another writer holds the slot.
    #[error("cache lock is held: {lock_path}")]
    LockBusy { lock_path: PathBuf },

    /// A waiter exhausted its budget polling a sentinel. Usually a stale
    /// lock left by a killed writer; the message names the file to
    /// remove.
    #[error(
        "timed out after {waited_secs}s waiting on cache lock {lock_path}; \
         if no other process is running, remove the file manually"
    )]
    LockTimeout { lock_path: PathBuf, waited_secs: u64 },

    /// A digest with no value cannot address a cache slot.
    #[error("hash has no value, cannot address cache entry: {hash}")]
    UncomputedHash { hash: HashRef },

    /// The underlying fetch failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Verification of a materialized file failed at the I/O level.
    #[error(transparent)]
    Digest(#[from] DigestError),

    /// Filesystem failure inside the cache directory.
    #[error("cache i/o failure at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
