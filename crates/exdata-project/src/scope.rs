//! # Scope — Hierarchical Remote Resolution
//!
//! A `Scope` is one configuration node bound to a directory subtree. It
//! owns the remotes its config file declares, resolves them lazily, and
//! may delegate to a parent scope in exactly two ways:
//!
//! 1. The special name `".."` resolves to the *parent scope's selected
//!    remote* (explicit inheritance inside an overlay entry).
//! 2. A directory with no scope config of its own is governed by the
//!    nearest ancestor scope — but that happens at the directory-walk
//!    level in [`crate::project::Project`], never inside name lookup.
//!
//! Remote-name lookup within one scope is strict: a name either exists
//! locally or the lookup fails with `ConfigError::UnknownRemote`.
//!
//! ## Cycle Safety
//!
//! Overlay references are resolved during construction with an explicit
//! "currently resolving" stack. Revisiting a name on the stack is a
//! structured `ConfigError::RemoteCycle`, raised before any backend is
//! consulted — the overlay relation of every constructed `Remote` is
//! therefore acyclic by the time it can be used.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use exdata_core::{ConfigError, HashAlgorithm};
use exdata_remote::{BackendContext, BackendRegistry, Remote};
use tracing::debug;

use crate::config::{RemoteConfig, ScopeConfig, PARENT_REMOTE_NAME};

/// Everything a scope needs from its project to construct remotes.
pub struct ResolveEnv<'a> {
    /// The backend registry owned by the project.
    pub registry: &'a BackendRegistry,
    /// Canonical project root.
    pub project_root: &'a Path,
    /// The digest algorithm in use.
    pub algorithm: HashAlgorithm,
}

/// A configuration node bound to a directory subtree.
///
/// Created once per distinct config file and cached by the project for
/// its lifetime; never mutated after load.
pub struct Scope {
    config_file: PathBuf,
    dir_rel: PathBuf,
    parent: Option<Arc<Scope>>,
    selected_name: String,
    remotes_config: HashMap<String, RemoteConfig>,
    file_overrides: HashMap<String, RemoteConfig>,
    resolved: RefCell<HashMap<String, Arc<Remote>>>,
    loading: RefCell<Vec<String>>,
}

impl Scope {
    /// Build a scope from its parsed config and resolve its selected
    /// remote eagerly, so that unknown names and overlay cycles surface
    /// at construction time rather than on first use.
    pub fn load(
        config: ScopeConfig,
        config_file: PathBuf,
        dir_rel: PathBuf,
        parent: Option<Arc<Scope>>,
        env: &ResolveEnv<'_>,
    ) -> Result<Arc<Self>, ConfigError> {
        let scope = Arc::new(Self {
            config_file,
            dir_rel,
            parent,
            selected_name: config.remote,
            remotes_config: config.remotes.into_iter().collect(),
            file_overrides: config.file_overrides.into_iter().collect(),
            resolved: RefCell::new(HashMap::new()),
            loading: RefCell::new(Vec::new()),
        });
        scope.selected_remote(env)?;
        Ok(scope)
    }

    /// The config file this scope was loaded from (its identity).
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// The scope's directory, relative to the project root.
    pub fn dir_rel(&self) -> &Path {
        &self.dir_rel
    }

    /// The parent scope, if this is not the root scope.
    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    /// The scope's selected remote.
    pub fn selected_remote(&self, env: &ResolveEnv<'_>) -> Result<Arc<Remote>, ConfigError> {
        let name = self.selected_name.clone();
        self.remote(&name, env)
    }

    /// Resolve a remote by name within this scope.
    ///
    /// `".."` resolves to the parent scope's selected remote; referencing
    /// it at the project root is fatal. Other names must exist locally.
    pub fn remote(&self, name: &str, env: &ResolveEnv<'_>) -> Result<Arc<Remote>, ConfigError> {
        if name == PARENT_REMOTE_NAME {
            return match &self.parent {
                Some(parent) => parent.selected_remote(env),
                None => Err(ConfigError::ParentAtRoot),
            };
        }
        if let Some(remote) = self.resolved.borrow().get(name) {
            return Ok(remote.clone());
        }
        let config = self
            .remotes_config
            .get(name)
            .ok_or_else(|| ConfigError::UnknownRemote {
                name: name.to_string(),
            })?
            .clone();
        self.resolve_with_cycle_check(name, &config, env)
    }

    /// The remote responsible for `project_rel` within this scope:
    /// a file override if one matches, otherwise the selected remote.
    pub fn remote_for_relpath(
        &self,
        project_rel: &Path,
        env: &ResolveEnv<'_>,
    ) -> Result<Arc<Remote>, ConfigError> {
        let scope_rel = project_rel.strip_prefix(&self.dir_rel).unwrap_or(project_rel);
        let key = scope_rel.to_string_lossy().to_string();
        if let Some(config) = self.file_overrides.get(&key).cloned() {
            // Cached under a synthetic name so repeated lookups reuse the
            // constructed remote.
            let synthetic = format!("file_overrides:{key}");
            if let Some(remote) = self.resolved.borrow().get(&synthetic) {
                return Ok(remote.clone());
            }
            debug!(file = %key, "using file override remote");
            return self.resolve_with_cycle_check(&synthetic, &config, env);
        }
        self.selected_remote(env)
    }

    /// Construct a remote under cycle protection and memoize it.
    fn resolve_with_cycle_check(
        &self,
        name: &str,
        config: &RemoteConfig,
        env: &ResolveEnv<'_>,
    ) -> Result<Arc<Remote>, ConfigError> {
        {
            let loading = self.loading.borrow();
            if loading.iter().any(|n| n == name) {
                let mut stack = loading.clone();
                stack.push(name.to_string());
                return Err(ConfigError::RemoteCycle { stack });
            }
        }
        self.loading.borrow_mut().push(name.to_string());
        let result = self.build_remote(name, config, env);
        self.loading.borrow_mut().pop();
        let remote = Arc::new(result?);
        self.resolved
            .borrow_mut()
            .insert(name.to_string(), remote.clone());
        Ok(remote)
    }

    /// Resolve the overlay (if any), construct the backend, assemble.
    fn build_remote(
        &self,
        name: &str,
        config: &RemoteConfig,
        env: &ResolveEnv<'_>,
    ) -> Result<Remote, ConfigError> {
        let overlay = match &config.overlay {
            Some(overlay_name) => Some(self.remote(overlay_name, env)?),
            None => None,
        };
        let context = BackendContext {
            project_root: env.project_root.to_path_buf(),
            config_file: self.config_file.clone(),
            algorithm: env.algorithm,
        };
        let backend = env
            .registry
            .create(&config.backend, &config.backend_node(), &context)?;
        Ok(Remote::new(name, backend, overlay).with_origin(&self.config_file))
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("config_file", &self.config_file)
            .field("dir_rel", &self.dir_rel)
            .field("selected", &self.selected_name)
            .field("parent", &self.parent.as_ref().map(|p| p.config_file.clone()))
            .finish()
    }
}
