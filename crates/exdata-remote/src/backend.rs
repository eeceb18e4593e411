//! # Backend Trait and Registry
//!
//! A `Backend` is one storage mechanism: it can answer whether it holds a
//! digest, fetch the bytes for a digest, and optionally accept uploads.
//! Backends are constructed from opaque configuration nodes through the
//! [`BackendRegistry`], an explicit `tag -> factory` map populated at
//! startup from a built-in table plus one optional, statically-typed
//! extension callback supplied by the host application.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use exdata_core::{ConfigError, HashAlgorithm, HashRef, TransferError};

/// Capability interface for one storage mechanism.
///
/// ## Contract
///
/// - `hash` is the authoritative key for every operation. `relpath` is
///   advisory metadata (project-relative path of the artifact) and must
///   never substitute for the hash check.
/// - `fetch` is given a destination that does not exist, and must not
///   leave a partial file behind on failure; the caller treats any file
///   present after an error as garbage and removes it.
/// - `put` may assume the hash matches the source file's contents.
pub trait Backend {
    /// A short description of this backend for diagnostics (its tag plus
    /// whatever location detail is useful, e.g. `mock:/p/files`).
    fn describe(&self) -> String;

    /// Whether this backend accepts uploads.
    fn can_upload(&self) -> bool {
        false
    }

    /// Whether the backend holds the given digest.
    fn has(&self, hash: &HashRef, relpath: Option<&Path>) -> Result<bool, TransferError>;

    /// Fetch the bytes for `hash` into `dest`.
    fn fetch(
        &self,
        hash: &HashRef,
        relpath: Option<&Path>,
        dest: &Path,
    ) -> Result<(), TransferError>;

    /// Upload `source` (whose digest is `hash`) to the backend.
    ///
    /// The default implementation fails with `UploadUnsupported`.
    fn put(
        &self,
        _hash: &HashRef,
        _relpath: &Path,
        _source: &Path,
    ) -> Result<(), TransferError> {
        Err(TransferError::UploadUnsupported {
            backend: self.describe(),
        })
    }
}

impl std::fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Construction context handed to backend factories.
///
/// Carries the project-level facts a backend may need to resolve its
/// configuration, without coupling backends to the project crate.
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// Canonical project root; backend-relative directories resolve here.
    pub project_root: PathBuf,
    /// The config file the backend's node came from, for diagnostics.
    pub config_file: PathBuf,
    /// The digest algorithm in use for this project.
    pub algorithm: HashAlgorithm,
}

/// Builds a backend from its opaque configuration node.
pub type BackendFactory =
    Box<dyn Fn(&serde_yaml::Mapping, &BackendContext) -> Result<Box<dyn Backend>, ConfigError>>;

/// The explicit `tag -> factory` table.
///
/// Replaces dynamic backend-class loading: the set of constructible
/// backends is fixed once the registry is built, and registering the same
/// tag twice is a hard [`ConfigError::DuplicateBackend`].
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// The default registry: the built-in `mock` backend.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        // Infallible: the table is empty.
        let _ = registry.register("mock", crate::mock::MockBackend::factory());
        registry
    }

    /// Register a factory under `tag`.
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        factory: BackendFactory,
    ) -> Result<(), ConfigError> {
        let tag = tag.into();
        if self.factories.contains_key(&tag) {
            return Err(ConfigError::DuplicateBackend { tag });
        }
        self.factories.insert(tag, factory);
        Ok(())
    }

    /// Merge additional `(tag, factory)` entries from a host extension
    /// hook. Any collision with an existing tag is fatal.
    pub fn extend_with(
        &mut self,
        entries: Vec<(String, BackendFactory)>,
    ) -> Result<(), ConfigError> {
        for (tag, factory) in entries {
            self.register(tag, factory)?;
        }
        Ok(())
    }

    /// Construct a backend for `tag` from its configuration node.
    pub fn create(
        &self,
        tag: &str,
        config: &serde_yaml::Mapping,
        context: &BackendContext,
    ) -> Result<Box<dyn Backend>, ConfigError> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| ConfigError::UnknownBackend {
                tag: tag.to_string(),
            })?;
        factory(config, context)
    }

    /// The registered tags, for diagnostics.
    pub fn tags(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Fetch a required string value from a backend configuration node.
pub(crate) fn config_str(
    config: &serde_yaml::Mapping,
    key: &str,
    context: &BackendContext,
) -> Result<String, ConfigError> {
    config
        .get(key)
        .and_then(serde_yaml::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::Invalid {
            path: context.config_file.clone(),
            reason: format!("backend config requires string key '{key}'"),
        })
}
