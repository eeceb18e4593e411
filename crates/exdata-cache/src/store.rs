//! # Cache Store — Hash-Sharded, Lock-Protected Artifact Cache
//!
//! On-disk layout: `<cache_root>/<algorithm>/<v[0:2]>/<v[2:4]>/<v>`,
//! with a sibling `<entry>.lock` sentinel while a writer populates the
//! slot. Entries are promoted read-only once verified and treated as
//! immutable afterwards; mutation only happens through
//! delete-then-repopulate, never in place.
//!
//! ## State machine for `get`
//!
//! ```text
//! CheckCache ──entry exists──▶ ValidateCached ──ok──▶ CACHED
//!     │                            │
//!     │                       mismatch: evict entry
//!     │                            │
//!     └──────────▶ Populate ◀──────┘
//!                    │  acquire lock, fetch into slot,
//!                    │  promote read-only, release lock
//!                    ▼
//!                DOWNLOADED
//! ```
//!
//! Writer contention is resolved by waiting: a `get` that loses the
//! exclusive-create race goes back to waiting on the sentinel and then
//! finds the completed entry.

use std::fs;
use std::path::{Path, PathBuf};

use exdata_core::{HashRef, TransferError};
use tracing::{debug, warn};

use crate::lock::{wait_until_free, CacheLock, LockWait};
use crate::CacheError;

/// How `get` materializes the cached file at the destination.
#[derive(Debug, Clone, Copy)]
pub struct GetOptions {
    /// Symlink from the read-only cache entry rather than copying.
    pub symlink: bool,
    /// Consult and populate the cache; `false` fetches straight to the
    /// destination.
    pub use_cache: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            symlink: false,
            use_cache: true,
        }
    }
}

/// Terminal state of a successful `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Served from a verified cache entry.
    Cached,
    /// Fetched from the remote (and, unless bypassed, promoted).
    Downloaded,
}

/// The fetch function the store drives on a miss; typically a remote's
/// `fetch_direct`, which verifies the digest before returning.
pub type FetchFn<'a> = &'a dyn Fn(&HashRef, &Path) -> Result<(), TransferError>;

/// A local, multi-process-safe, content-addressed artifact cache.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    wait: LockWait,
}

impl CacheStore {
    /// A store rooted at `root` with the default lock-wait policy.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            wait: LockWait::default(),
        }
    }

    /// Override the lock-wait policy (tests use short budgets).
    pub fn with_lock_wait(mut self, wait: LockWait) -> Self {
        self.wait = wait;
        self
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The slot path for a digest:
    /// `<root>/<algorithm>/<v[0:2]>/<v[2:4]>/<v>`.
    pub fn entry_path(&self, hash: &HashRef) -> Result<PathBuf, CacheError> {
        let value = hash.value();
        if value.len() < 4 {
            return Err(CacheError::UncomputedHash { hash: hash.clone() });
        }
        Ok(self
            .root
            .join(hash.algorithm().as_str())
            .join(&value[0..2])
            .join(&value[2..4])
            .join(value))
    }

    /// Retrieve the content for `hash` at `dest`.
    ///
    /// `dest` must not exist. On success the destination's bytes match
    /// `hash` (idempotent fetch); a corrupted cache entry is evicted and
    /// re-fetched once, and a second mismatch is fatal.
    pub fn get(
        &self,
        hash: &HashRef,
        dest: &Path,
        options: GetOptions,
        fetch: FetchFn<'_>,
    ) -> Result<Outcome, CacheError> {
        if !hash.has_value() {
            return Err(CacheError::UncomputedHash { hash: hash.clone() });
        }
        if !options.use_cache {
            fetch(hash, dest)?;
            return Ok(Outcome::Downloaded);
        }

        let entry = self.entry_path(hash)?;
        if let Some(parent) = entry.parent() {
            fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        loop {
            wait_until_free(&entry, &self.wait)?;

            if entry.is_file() {
                materialize(&entry, dest, options.symlink)?;
                if hash.verify(dest)? {
                    debug!(%hash, "cache hit");
                    return Ok(Outcome::Cached);
                }
                // The cache was corrupted externally. Evict and re-fetch.
                warn!(%hash, entry = %entry.display(), "cached entry failed verification, evicting");
                self.evict(&entry)?;
                if dest.is_symlink() {
                    // The symlink points at the deleted entry; remove it
                    // so population does not write through a dangling link.
                    fs::remove_file(dest).map_err(|source| CacheError::Io {
                        path: dest.to_path_buf(),
                        source,
                    })?;
                }
                self.populate(hash, &entry, fetch)?;
                materialize(&entry, dest, options.symlink)?;
                // The fetch step verified; no re-verification needed.
                return Ok(Outcome::Downloaded);
            }

            match CacheLock::acquire(&entry) {
                Ok(lock) => {
                    if entry.is_file() {
                        // A writer completed between the check and the
                        // acquire; serve the entry on the next pass.
                        drop(lock);
                        continue;
                    }
                    self.populate_locked(hash, &entry, fetch, &lock)?;
                    drop(lock);
                    materialize(&entry, dest, options.symlink)?;
                    return Ok(Outcome::Downloaded);
                }
                Err(CacheError::LockBusy { .. }) => {
                    // Lost the race to another writer; wait for it.
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Remove a cache entry (entries are read-only; the containing
    /// directory stays writable, so deletion succeeds without prompting).
    pub fn evict(&self, entry: &Path) -> Result<(), CacheError> {
        fs::remove_file(entry).map_err(|source| CacheError::Io {
            path: entry.to_path_buf(),
            source,
        })
    }

    /// Acquire the slot lock and populate it.
    fn populate(&self, hash: &HashRef, entry: &Path, fetch: FetchFn<'_>) -> Result<(), CacheError> {
        loop {
            wait_until_free(entry, &self.wait)?;
            if entry.is_file() {
                // Another process repopulated the slot while we waited.
                return Ok(());
            }
            match CacheLock::acquire(entry) {
                Ok(lock) => {
                    if entry.is_file() {
                        return Ok(());
                    }
                    return self.populate_locked(hash, entry, fetch, &lock);
                }
                Err(CacheError::LockBusy { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Fetch into the slot and promote it read-only. The lock is held by
    /// the caller and released on drop, on success and failure alike.
    fn populate_locked(
        &self,
        hash: &HashRef,
        entry: &Path,
        fetch: FetchFn<'_>,
        _lock: &CacheLock,
    ) -> Result<(), CacheError> {
        debug!(%hash, entry = %entry.display(), "populating cache slot");
        if let Err(err) = fetch(hash, entry) {
            // Never leave a partial, unverified file in the slot.
            if entry.exists() {
                let _ = fs::remove_file(entry);
            }
            return Err(err.into());
        }
        let mut perms = fs::metadata(entry)
            .map_err(|source| CacheError::Io {
                path: entry.to_path_buf(),
                source,
            })?
            .permissions();
        perms.set_readonly(true);
        fs::set_permissions(entry, perms).map_err(|source| CacheError::Io {
            path: entry.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

/// Place the cached entry at `dest`: symlink to the read-only slot, or
/// copy and restore write permission.
fn materialize(entry: &Path, dest: &Path, symlink: bool) -> Result<(), CacheError> {
    if symlink {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(entry, dest).map_err(|source| CacheError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        }
        #[cfg(not(unix))]
        {
            return Err(CacheError::Io {
                path: dest.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "symlink materialization requires unix",
                ),
            });
        }
    } else {
        fs::copy(entry, dest).map_err(|source| CacheError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        let mut perms = fs::metadata(dest)
            .map_err(|source| CacheError::Io {
                path: dest.to_path_buf(),
                source,
            })?
            .permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(dest, perms).map_err(|source| CacheError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use exdata_core::HashAlgorithm;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const PAYLOAD: &[u8] = b"cached payload";

    fn payload_hash(dir: &TempDir) -> HashRef {
        let path = dir.path().join("seed");
        fs::write(&path, PAYLOAD).unwrap();
        let hash = HashAlgorithm::Sha512.compute(&path).unwrap();
        fs::remove_file(&path).unwrap();
        hash
    }

    fn serving_fetch(counter: Arc<AtomicUsize>) -> impl Fn(&HashRef, &Path) -> Result<(), TransferError> {
        move |_hash, dest| {
            counter.fetch_add(1, Ordering::SeqCst);
            fs::write(dest, PAYLOAD)?;
            Ok(())
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        let hash = payload_hash(&dir);
        let count = Arc::new(AtomicUsize::new(0));
        let fetch = serving_fetch(count.clone());

        let dest1 = dir.path().join("out1.bin");
        let outcome = store.get(&hash, &dest1, GetOptions::default(), &fetch).unwrap();
        assert_eq!(outcome, Outcome::Downloaded);
        assert!(hash.verify(&dest1).unwrap());

        let dest2 = dir.path().join("out2.bin");
        let outcome = store.get(&hash, &dest2, GetOptions::default(), &fetch).unwrap();
        assert_eq!(outcome, Outcome::Cached);
        assert!(hash.verify(&dest2).unwrap());

        // Exactly one underlying fetch across both calls.
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_entry_is_read_only_and_sharded() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        let hash = payload_hash(&dir);
        let fetch = serving_fetch(Arc::new(AtomicUsize::new(0)));
        store
            .get(&hash, &dir.path().join("out.bin"), GetOptions::default(), &fetch)
            .unwrap();

        let entry = store.entry_path(&hash).unwrap();
        assert!(entry.is_file());
        assert!(fs::metadata(&entry).unwrap().permissions().readonly());
        let value = hash.value();
        assert!(entry.ends_with(
            Path::new("sha512")
                .join(&value[0..2])
                .join(&value[2..4])
                .join(value)
        ));
        // No lock sentinel left behind.
        assert!(!crate::lock::sentinel_path(&entry).exists());
    }

    #[test]
    fn test_symlink_materialization() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        let hash = payload_hash(&dir);
        let fetch = serving_fetch(Arc::new(AtomicUsize::new(0)));
        let dest = dir.path().join("out.bin");
        let options = GetOptions {
            symlink: true,
            use_cache: true,
        };
        store.get(&hash, &dest, options, &fetch).unwrap();
        assert!(dest.is_symlink());
        assert!(hash.verify(&dest).unwrap());
    }

    #[test]
    fn test_no_cache_bypass() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        let hash = payload_hash(&dir);
        let count = Arc::new(AtomicUsize::new(0));
        let fetch = serving_fetch(count.clone());
        let options = GetOptions {
            symlink: false,
            use_cache: false,
        };

        let dest1 = dir.path().join("out1.bin");
        let dest2 = dir.path().join("out2.bin");
        assert_eq!(store.get(&hash, &dest1, options, &fetch).unwrap(), Outcome::Downloaded);
        assert_eq!(store.get(&hash, &dest2, options, &fetch).unwrap(), Outcome::Downloaded);
        // Bypassing the cache fetches every time and promotes nothing.
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!store.entry_path(&hash).unwrap().exists());
    }

    #[test]
    fn test_corruption_self_heal() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        let hash = payload_hash(&dir);
        let count = Arc::new(AtomicUsize::new(0));
        let fetch = serving_fetch(count.clone());

        let dest1 = dir.path().join("out1.bin");
        store.get(&hash, &dest1, GetOptions::default(), &fetch).unwrap();

        // Tamper with the promoted entry behind the store's back.
        let entry = store.entry_path(&hash).unwrap();
        let mut perms = fs::metadata(&entry).unwrap().permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(&entry, perms).unwrap();
        fs::write(&entry, b"tampered").unwrap();

        let dest2 = dir.path().join("out2.bin");
        let outcome = store.get(&hash, &dest2, GetOptions::default(), &fetch).unwrap();
        assert_eq!(outcome, Outcome::Downloaded);
        assert!(hash.verify(&dest2).unwrap());
        // The entry was re-fetched and is valid again.
        assert!(hash.verify(&entry).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_corruption_self_heal_with_symlink_dest() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        let hash = payload_hash(&dir);
        let fetch = serving_fetch(Arc::new(AtomicUsize::new(0)));
        let options = GetOptions {
            symlink: true,
            use_cache: true,
        };

        let dest1 = dir.path().join("out1.bin");
        store.get(&hash, &dest1, options, &fetch).unwrap();

        let entry = store.entry_path(&hash).unwrap();
        let mut perms = fs::metadata(&entry).unwrap().permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(&entry, perms).unwrap();
        fs::write(&entry, b"tampered").unwrap();

        // Verification reads through the fresh symlink, finds the
        // tampered entry, and the dangling link is replaced after the
        // slot is repopulated.
        let dest2 = dir.path().join("out2.bin");
        let outcome = store.get(&hash, &dest2, options, &fetch).unwrap();
        assert_eq!(outcome, Outcome::Downloaded);
        assert!(dest2.is_symlink());
        assert!(hash.verify(&dest2).unwrap());
    }

    #[test]
    fn test_failed_fetch_leaves_no_entry_and_releases_lock() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        let hash = payload_hash(&dir);
        let failing = |hash: &HashRef, _dest: &Path| -> Result<(), TransferError> {
            Err(TransferError::NotFound {
                backend: "test".to_string(),
                hash: hash.clone(),
            })
        };

        let err = store
            .get(&hash, &dir.path().join("out.bin"), GetOptions::default(), &failing)
            .unwrap_err();
        assert!(matches!(err, CacheError::Transfer(TransferError::NotFound { .. })));

        let entry = store.entry_path(&hash).unwrap();
        assert!(!entry.exists());
        assert!(!crate::lock::sentinel_path(&entry).exists());

        // The slot is usable again afterwards.
        let fetch = serving_fetch(Arc::new(AtomicUsize::new(0)));
        store
            .get(&hash, &dir.path().join("out.bin"), GetOptions::default(), &fetch)
            .unwrap();
    }

    #[test]
    fn test_uncomputed_hash_rejected() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        let empty = HashRef::empty(HashAlgorithm::Sha512);
        let fetch = serving_fetch(Arc::new(AtomicUsize::new(0)));
        let err = store
            .get(&empty, &dir.path().join("out.bin"), GetOptions::default(), &fetch)
            .unwrap_err();
        assert!(matches!(err, CacheError::UncomputedHash { .. }));
    }

    #[test]
    fn test_single_writer_many_readers() {
        // N concurrent gets for the same hash, sharing one cache
        // directory through separate store handles (simulating separate
        // processes): exactly one fetch, N successful materializations.
        const N: usize = 8;
        let dir = TempDir::new().unwrap();
        let cache_root = dir.path().join("cache");
        let hash = payload_hash(&dir);
        let count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..N {
            let cache_root = cache_root.clone();
            let hash = hash.clone();
            let count = count.clone();
            let dest = dir.path().join(format!("out{i}.bin"));
            handles.push(std::thread::spawn(move || {
                let store = CacheStore::new(cache_root).with_lock_wait(LockWait {
                    timeout: std::time::Duration::from_secs(30),
                    poll: std::time::Duration::from_millis(2),
                    warn_after: std::time::Duration::from_secs(5),
                });
                let fetch = move |_hash: &HashRef, dest: &Path| -> Result<(), TransferError> {
                    count.fetch_add(1, Ordering::SeqCst);
                    // Give the other threads time to pile up on the lock.
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    fs::write(dest, PAYLOAD)?;
                    Ok(())
                };
                store.get(&hash, &dest, GetOptions::default(), &fetch).unwrap();
                dest
            }));
        }
        for handle in handles {
            let dest = handle.join().unwrap();
            assert!(hash.verify(&dest).unwrap());
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
