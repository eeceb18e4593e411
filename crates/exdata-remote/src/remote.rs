//! # Remote — Named Backend Plus Overlay Chain
//!
//! A `Remote` wraps one backend under a configuration name, with an
//! optional *overlay*: a fallback remote consulted when the primary does
//! not hold a digest. Overlays form a singly-linked chain, walked
//! strictly outward (child → ancestor), never the reverse.
//!
//! ## Invariant
//!
//! The overlay relation is acyclic. This is enforced at construction
//! time by the scope's in-progress resolution stack, not at use time;
//! by the time a `Remote` exists, its chain is known to terminate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use exdata_core::{DigestError, HashRef, TransferError};
use tracing::{debug, info};

use crate::backend::Backend;

/// A named backend instance plus an optional fallback remote.
pub struct Remote {
    name: String,
    backend: Box<dyn Backend>,
    overlay: Option<Arc<Remote>>,
    origin: Option<PathBuf>,
}

impl Remote {
    /// Assemble a remote. Cycle safety is the constructor's caller's
    /// responsibility (the scope resolution stack).
    pub fn new(name: impl Into<String>, backend: Box<dyn Backend>, overlay: Option<Arc<Remote>>) -> Self {
        Self {
            name: name.into(),
            backend,
            overlay,
            origin: None,
        }
    }

    /// Record the config file this remote was declared in, for diagnostics.
    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// The config file this remote was declared in, if known.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// The configuration name of this remote.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fallback remote, if any.
    pub fn overlay(&self) -> Option<&Arc<Remote>> {
        self.overlay.as_ref()
    }

    /// A short description of the underlying backend, for diagnostics.
    pub fn describe_backend(&self) -> String {
        self.backend.describe()
    }

    /// The remote names along the overlay chain, starting with this one.
    pub fn chain_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        let mut node = self.overlay.as_ref();
        while let Some(remote) = node {
            names.push(remote.name.clone());
            node = remote.overlay.as_ref();
        }
        names
    }

    /// Whether this remote or any overlay holds the digest.
    pub fn has(&self, hash: &HashRef, relpath: Option<&Path>) -> Result<bool, TransferError> {
        if self.backend.has(hash, relpath)? {
            return Ok(true);
        }
        match &self.overlay {
            Some(overlay) => overlay.has(hash, relpath),
            None => Ok(false),
        }
    }

    /// Fetch `hash` into `dest`, falling back through the overlay chain.
    ///
    /// `dest` must not exist. The fetched bytes are verified against
    /// `hash`; a mismatch removes the file and is fatal (the overlay is
    /// only consulted for `NotFound`, never to paper over corruption).
    pub fn fetch_direct(
        &self,
        hash: &HashRef,
        relpath: Option<&Path>,
        dest: &Path,
    ) -> Result<(), TransferError> {
        if dest.exists() {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("fetch destination already exists: {}", dest.display()),
            )));
        }
        debug!(remote = %self.name, %hash, "fetching");
        match self.backend.fetch(hash, relpath, dest) {
            Ok(()) => {
                if let Err(err) = hash.check(dest) {
                    // The backend produced bytes, but the wrong ones.
                    let _ = std::fs::remove_file(dest);
                    return Err(TransferError::Digest(err));
                }
                Ok(())
            }
            Err(err) => {
                // Any file present after a failed fetch is garbage.
                if dest.exists() {
                    let _ = std::fs::remove_file(dest);
                }
                match (&err, &self.overlay) {
                    (TransferError::NotFound { .. }, Some(overlay)) => {
                        debug!(
                            remote = %self.name,
                            overlay = %overlay.name,
                            %hash,
                            "not found, trying overlay"
                        );
                        overlay.fetch_direct(hash, relpath, dest)
                    }
                    _ => Err(err),
                }
            }
        }
    }

    /// Publish `source` (whose digest is `hash`) to this remote.
    ///
    /// Returns `true` if an upload actually happened. The dedup check
    /// consults the immediate backend only, never the overlay chain:
    /// publishing is not skipped merely because a read-only overlay
    /// happens to hold the content.
    pub fn publish(
        &self,
        hash: &HashRef,
        relpath: &Path,
        source: &Path,
    ) -> Result<bool, TransferError> {
        if !self.backend.can_upload() {
            return Err(TransferError::UploadUnsupported {
                backend: self.backend.describe(),
            });
        }
        if self.backend.has(hash, Some(relpath))? {
            info!(remote = %self.name, %hash, "already uploaded");
            return Ok(false);
        }
        info!(remote = %self.name, %hash, "uploading");
        self.backend.put(hash, relpath, source)?;
        Ok(true)
    }

    /// Fetch with verification already guaranteed by `fetch_direct`; kept
    /// as the seam the cache layer plugs in as its underlying fetch.
    pub fn fetch_fn<'a>(
        &'a self,
        relpath: Option<&'a Path>,
    ) -> impl Fn(&HashRef, &Path) -> Result<(), TransferError> + 'a {
        move |hash, dest| self.fetch_direct(hash, relpath, dest)
    }
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("name", &self.name)
            .field("backend", &self.backend.describe())
            .field("overlay", &self.overlay.as_ref().map(|o| o.name.clone()))
            .finish()
    }
}

/// A digest-mismatch error surfaced through a remote fetch.
pub fn is_mismatch(err: &TransferError) -> bool {
    matches!(err, TransferError::Digest(DigestError::Mismatch { .. }))
}
