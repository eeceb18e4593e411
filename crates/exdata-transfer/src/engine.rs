//! # Transfer Engine
//!
//! Orchestrates one operation end to end: map the input path into the
//! project, resolve the responsible remote through the scope hierarchy,
//! then drive the cache (fetch) or the remote (publish, check). Sidecar
//! files are the on-disk source of truth for tracked digests; `fetch`
//! reads them, `publish` refreshes them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use exdata_cache::{CacheStore, GetOptions, Outcome};
use exdata_core::HashRef;
use exdata_project::Project;
use exdata_remote::Remote;
use tracing::{debug, info};

use crate::ExdataError;

/// Remote-existence checking mode for `fetch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckFile {
    /// No remote check; fetch through the cache as normal.
    #[default]
    None,
    /// Only check that the remote holds the digest; do not fetch.
    Only,
    /// Check the remote first, then fetch as normal.
    Extra,
}

/// Options for [`TransferEngine::fetch`].
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Overwrite an existing output file.
    pub force: bool,
    /// Consult and populate the shared cache.
    pub use_cache: bool,
    /// Symlink the output from the cache instead of copying.
    pub symlink: bool,
    /// Remote-existence checking mode.
    pub check_file: CheckFile,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            force: false,
            use_cache: true,
            symlink: false,
            check_file: CheckFile::None,
        }
    }
}

/// What a `fetch` call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Content materialized at the output path.
    Fetched(Outcome),
    /// `CheckFile::Only`: existence confirmed, nothing fetched.
    CheckedOnly,
}

/// What a `publish` call actually did.
#[derive(Debug, Clone)]
pub struct PublishReport {
    /// The digest of the published content.
    pub hash: HashRef,
    /// Whether an upload happened (`false` when the remote already
    /// held the content).
    pub uploaded: bool,
}

/// One engine per loaded project; borrows the project, owns the cache
/// handle.
pub struct TransferEngine<'a> {
    project: &'a Project,
    cache: CacheStore,
    remote_override: Option<Arc<Remote>>,
}

impl<'a> TransferEngine<'a> {
    /// An engine over `project`, caching in the project's configured
    /// cache directory.
    pub fn new(project: &'a Project) -> Self {
        Self {
            project,
            cache: CacheStore::new(project.cache_dir()),
            remote_override: None,
        }
    }

    /// Replace the cache handle (tests point this at a scratch root).
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = cache;
        self
    }

    /// Bypass scope resolution and use this remote for every operation
    /// (the CLI's `--remote` override).
    pub fn with_remote_override(mut self, remote: Arc<Remote>) -> Self {
        self.remote_override = Some(remote);
        self
    }

    /// The data-file path a sidecar file describes
    /// (`x.bin.sha512` → `x.bin`).
    pub fn data_path_for(&self, hash_file: &Path) -> Result<PathBuf, ExdataError> {
        self.project
            .algorithm()
            .strip_sidecar(hash_file)
            .ok_or_else(|| ExdataError::NotSidecarFile {
                path: hash_file.to_path_buf(),
                suffix: self.project.algorithm().suffix(),
            })
    }

    fn remote_for(&self, rel: &Path) -> Result<Arc<Remote>, ExdataError> {
        match &self.remote_override {
            Some(remote) => Ok(remote.clone()),
            None => Ok(self.project.resolve_remote(rel)?),
        }
    }

    /// The remote-config dump for the remote responsible for the
    /// project-relative path `rel` (`--verbose` and failure diagnostics).
    pub fn describe_remote(&self, rel: &Path) -> Result<serde_json::Value, ExdataError> {
        let remote = self.remote_for(rel)?;
        Ok(self.project.debug_dump_remote_config(&remote))
    }

    fn remote_missing(&self, remote: &Remote, rel: &Path, hash: &HashRef) -> ExdataError {
        ExdataError::RemoteMissing {
            remote: remote.name().to_string(),
            relpath: rel.to_path_buf(),
            hash: hash.clone(),
            chain: self.project.debug_dump_remote_config(remote),
        }
    }

    /// Fetch the content a sidecar file describes into `output`.
    ///
    /// `hash_file` must be an absolute path inside the project ending
    /// with the sidecar suffix; `output` may be anywhere. Refuses to
    /// overwrite an existing output unless `options.force` is set.
    pub fn fetch(
        &self,
        hash_file: &Path,
        output: &Path,
        options: &FetchOptions,
    ) -> Result<FetchOutcome, ExdataError> {
        let data_path = self.data_path_for(hash_file)?;
        let rel = self.project.relpath(&data_path)?;
        let hash = HashRef::from_sidecar_file(self.project.algorithm(), hash_file)?;
        let remote = self.remote_for(&rel)?;
        debug!(relpath = %rel.display(), %hash, remote = %remote.name(), "fetch");

        if options.check_file != CheckFile::None {
            if !remote.has(&hash, Some(&rel))? {
                return Err(self.remote_missing(&remote, &rel, &hash));
            }
            if options.check_file == CheckFile::Only {
                return Ok(FetchOutcome::CheckedOnly);
            }
        }

        // symlink_metadata also catches a dangling symlink at the output.
        if output.symlink_metadata().is_ok() {
            if !options.force {
                return Err(ExdataError::OutputExists {
                    path: output.to_path_buf(),
                });
            }
            fs::remove_file(output).map_err(|source| ExdataError::Io {
                path: output.to_path_buf(),
                source,
            })?;
        }

        let get_options = GetOptions {
            symlink: options.symlink,
            use_cache: options.use_cache,
        };
        let fetch = remote.fetch_fn(Some(&rel));
        let outcome = self.cache.get(&hash, output, get_options, &fetch)?;
        Ok(FetchOutcome::Fetched(outcome))
    }

    /// Publish `source` to its responsible remote and refresh the
    /// sidecar file next to it.
    pub fn publish(&self, source: &Path) -> Result<PublishReport, ExdataError> {
        let algorithm = self.project.algorithm();
        if let Some(data_path) = algorithm.strip_sidecar(source) {
            return Err(ExdataError::SidecarInput {
                path: source.to_path_buf(),
                data_path,
            });
        }
        let rel = self.project.relpath(source)?;
        let remote = self.remote_for(&rel)?;
        let hash = algorithm.compute(source)?;
        let uploaded = remote.publish(&hash, &rel, source)?;

        let sidecar = algorithm.sidecar_path(source);
        info!(sidecar = %sidecar.display(), %hash, "updating sidecar");
        hash.write_sidecar_file(&sidecar)?;
        Ok(PublishReport { hash, uploaded })
    }

    /// Confirm the responsible remote (or its overlays) holds the digest
    /// recorded in `data_file`'s sidecar. Never touches the cache.
    pub fn check(&self, data_file: &Path) -> Result<(), ExdataError> {
        let algorithm = self.project.algorithm();
        let rel = self.project.relpath(data_file)?;
        let sidecar = algorithm.sidecar_path(data_file);
        let hash = HashRef::from_sidecar_file(algorithm, &sidecar)?;
        let remote = self.remote_for(&rel)?;
        if remote.has(&hash, Some(&rel))? {
            Ok(())
        } else {
            Err(self.remote_missing(&remote, &rel, &hash))
        }
    }
}
