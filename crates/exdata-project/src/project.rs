//! # Project — Root Context
//!
//! The `Project` is the explicit context object threaded through every
//! operation: canonical path mapping (root plus symlink-aware
//! alternates), the scope cache keyed by config-file identity, and the
//! backend registry. There are no ambient globals; one `Project` lives
//! for one process invocation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use exdata_core::{is_child_path, ConfigError, HashAlgorithm, PathError};
use exdata_remote::{BackendFactory, BackendRegistry, Remote};
use tracing::debug;

use crate::config::{
    self, find_project_root, parse_config_file, ProjectConfig, ScopeConfig, UserConfig,
    PROJECT_CONFIG_FILE, SCOPE_CONFIG_FILE,
};
use crate::scope::{ResolveEnv, Scope};

/// Options for [`Project::load`].
#[derive(Default)]
pub struct ProjectOptions {
    /// Override the user config file (defaults to
    /// `~/.config/exdata/config.yml`).
    pub user_config_file: Option<PathBuf>,
    /// Additional backend factories from the host application, merged
    /// into the built-in registry. Tag collisions are fatal.
    pub backend_extensions: Vec<(String, BackendFactory)>,
}

/// Root context: path mapping, scope cache, backend registry.
pub struct Project {
    name: String,
    root: PathBuf,
    root_alternatives: Vec<PathBuf>,
    algorithm: HashAlgorithm,
    cache_dir: PathBuf,
    registry: BackendRegistry,
    scopes: RefCell<HashMap<PathBuf, Arc<Scope>>>,
}

impl Project {
    /// Locate and load the project governing `guess_path`.
    ///
    /// Walks upward from `guess_path` to find the root sentinel
    /// (`.exdata.project.yml`), parses the project and user configs, and
    /// assembles the backend registry.
    pub fn load(guess_path: &Path, options: ProjectOptions) -> Result<Self, ConfigError> {
        let (root, discovered_alternatives) = find_project_root(guess_path)?;
        let config_file = root.join(PROJECT_CONFIG_FILE);
        let project_config: ProjectConfig = parse_config_file(&config_file)?;

        let user_config_file = options
            .user_config_file
            .or_else(config::default_user_config_file);
        let user_config = UserConfig::load(user_config_file.as_deref())?;

        let mut registry = BackendRegistry::builtin();
        registry.extend_with(options.backend_extensions)?;

        let mut root_alternatives = discovered_alternatives;
        root_alternatives.extend(project_config.root_alternatives.clone());

        debug!(name = %project_config.name, root = %root.display(), "project loaded");
        Ok(Self {
            name: project_config.name,
            root,
            root_alternatives,
            algorithm: HashAlgorithm::Sha512,
            cache_dir: user_config.cache_dir(),
            registry,
            scopes: RefCell::new(HashMap::new()),
        })
    }

    /// The project name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The digest algorithm for this project.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The local cache directory from the user config.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Map an absolute path to its project-relative form, trying the
    /// canonical root first and then each root alternative.
    pub fn relpath(&self, abs: &Path) -> Result<PathBuf, PathError> {
        if !abs.is_absolute() {
            return Err(PathError::NotAbsolute {
                path: abs.to_path_buf(),
            });
        }
        for root in std::iter::once(&self.root).chain(self.root_alternatives.iter()) {
            if is_child_path(abs, root) {
                // strip_prefix cannot fail after is_child_path.
                if let Ok(rel) = abs.strip_prefix(root) {
                    return Ok(rel.to_path_buf());
                }
            }
        }
        Err(PathError::OutsideProject {
            path: abs.to_path_buf(),
        })
    }

    /// Map a project-relative path to its absolute form under the
    /// canonical root.
    pub fn canonical_path(&self, rel: &Path) -> Result<PathBuf, PathError> {
        if rel.is_absolute() {
            return Err(PathError::NotRelative {
                path: rel.to_path_buf(),
            });
        }
        Ok(self.root.join(rel))
    }

    fn resolve_env(&self) -> ResolveEnv<'_> {
        ResolveEnv {
            registry: &self.registry,
            project_root: &self.root,
            algorithm: self.algorithm,
        }
    }

    /// Load the deepest scope governing `rel`.
    ///
    /// Walks from `rel`'s directory up to the project root collecting
    /// every scope config file, then constructs scopes top-down so each
    /// child's parent exists before the child. Every scope visited is
    /// memoized by its config-file path, so repeated lookups are O(1).
    pub fn load_scope(&self, rel: &Path) -> Result<Arc<Scope>, ConfigError> {
        let config_files = self.find_scope_config_files(rel)?;
        let mut scope: Option<Arc<Scope>> = None;
        for config_file in config_files {
            if let Some(cached) = self.scopes.borrow().get(&config_file) {
                scope = Some(cached.clone());
                continue;
            }
            let parsed: ScopeConfig = parse_config_file(&config_file)?;
            let dir_abs = config_file
                .parent()
                .unwrap_or(&self.root)
                .to_path_buf();
            let dir_rel = dir_abs
                .strip_prefix(&self.root)
                .unwrap_or(Path::new(""))
                .to_path_buf();
            let loaded = Scope::load(
                parsed,
                config_file.clone(),
                dir_rel,
                scope.clone(),
                &self.resolve_env(),
            )?;
            self.scopes.borrow_mut().insert(config_file, loaded.clone());
            scope = Some(loaded);
        }
        // The walk always yields at least the root scope config.
        scope.ok_or(ConfigError::MissingFile {
            path: self.root.join(SCOPE_CONFIG_FILE),
        })
    }

    /// The remote responsible for the project-relative path `rel`.
    pub fn resolve_remote(&self, rel: &Path) -> Result<Arc<Remote>, ConfigError> {
        let scope = self.load_scope(rel)?;
        scope.remote_for_relpath(rel, &self.resolve_env())
    }

    /// Resolve a one-off remote from a config node supplied outside any
    /// scope file (e.g. the CLI's `--remote` flag). Parented to the root
    /// scope so `".."` works.
    pub fn resolve_adhoc_remote(
        &self,
        config: crate::config::RemoteConfig,
    ) -> Result<Arc<Remote>, ConfigError> {
        let parent = self.load_scope(Path::new(""))?;
        let scope_config = ScopeConfig {
            remote: "command_line".to_string(),
            remotes: [("command_line".to_string(), config)].into_iter().collect(),
            file_overrides: Default::default(),
        };
        let scope = Scope::load(
            scope_config,
            PathBuf::from("<command_line>"),
            PathBuf::new(),
            Some(parent),
            &self.resolve_env(),
        )?;
        scope.selected_remote(&self.resolve_env())
    }

    /// Collect scope config files from the root down to `rel`'s directory.
    ///
    /// The root scope config is required; intermediate directories
    /// without one simply inherit the nearest ancestor scope.
    fn find_scope_config_files(&self, rel: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        let root_config = self.root.join(SCOPE_CONFIG_FILE);
        if !root_config.is_file() {
            return Err(ConfigError::MissingFile { path: root_config });
        }
        let mut files = vec![root_config];
        let mut dirs = Vec::new();
        let mut cur = rel.parent();
        while let Some(dir) = cur {
            if dir.as_os_str().is_empty() {
                break;
            }
            dirs.push(dir);
            cur = dir.parent();
        }
        for dir in dirs.into_iter().rev() {
            let candidate = self.root.join(dir).join(SCOPE_CONFIG_FILE);
            if candidate.is_file() {
                files.push(candidate);
            }
        }
        Ok(files)
    }

    /// Render a remote's full overlay chain with originating config
    /// files, for multi-hop resolution diagnostics.
    pub fn debug_dump_remote_config(&self, remote: &Remote) -> serde_json::Value {
        fn dump(remote: &Remote) -> serde_json::Value {
            let mut node = serde_json::Map::new();
            node.insert("name".to_string(), remote.name().into());
            node.insert("backend".to_string(), remote.describe_backend().into());
            if let Some(origin) = remote.origin() {
                node.insert(
                    "config_file".to_string(),
                    origin.display().to_string().into(),
                );
            }
            if let Some(overlay) = remote.overlay() {
                node.insert("overlay".to_string(), dump(overlay));
            }
            serde_json::Value::Object(node)
        }
        dump(remote)
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("root_alternatives", &self.root_alternatives)
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Lay out a project with a root scope and a nested scope at `sub/`.
    fn fixture() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("proj");
        fs::create_dir_all(root.join("files")).unwrap();
        fs::create_dir_all(root.join("sub/files")).unwrap();
        fs::create_dir_all(root.join("sub/data")).unwrap();
        fs::write(root.join("files/root.bin"), b"root data").unwrap();
        fs::write(root.join("sub/files/sub.bin"), b"sub data").unwrap();
        fs::write(root.join(PROJECT_CONFIG_FILE), "{name: demo}").unwrap();
        fs::write(
            root.join(SCOPE_CONFIG_FILE),
            "
remote: main
remotes:
  main: {backend: mock, dir: files, upload_dir: upload}
",
        )
        .unwrap();
        fs::write(
            root.join("sub").join(SCOPE_CONFIG_FILE),
            "
remote: subremote
remotes:
  subremote: {backend: mock, overlay: '..', dir: sub/files, upload_dir: sub/upload}
",
        )
        .unwrap();
        (dir, root)
    }

    fn load(root: &Path) -> Project {
        // Point the user config at a path that does not exist so the
        // defaults apply regardless of the host environment.
        Project::load(
            root,
            ProjectOptions {
                user_config_file: Some(root.join("no-user-config.yml")),
                backend_extensions: Vec::new(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_load_from_nested_guess() {
        let (_dir, root) = fixture();
        let project = Project::load(
            &root.join("sub/data"),
            ProjectOptions::default(),
        )
        .unwrap();
        assert_eq!(project.name(), "demo");
        assert_eq!(project.root(), root);
    }

    #[test]
    fn test_relpath_and_canonical_path() {
        let (_dir, root) = fixture();
        let project = load(&root);
        let rel = project.relpath(&root.join("sub/data/x.bin")).unwrap();
        assert_eq!(rel, PathBuf::from("sub/data/x.bin"));
        assert_eq!(
            project.canonical_path(&rel).unwrap(),
            root.join("sub/data/x.bin")
        );

        let err = project.relpath(Path::new("/elsewhere/x.bin")).unwrap_err();
        assert!(matches!(err, PathError::OutsideProject { .. }));
        let err = project.relpath(Path::new("relative/x.bin")).unwrap_err();
        assert!(matches!(err, PathError::NotAbsolute { .. }));
        let err = project.canonical_path(Path::new("/abs")).unwrap_err();
        assert!(matches!(err, PathError::NotRelative { .. }));
    }

    #[test]
    fn test_relpath_through_root_alternative() {
        let (dir, root) = fixture();
        let alt = dir.path().join("alt");
        fs::create_dir_all(&alt).unwrap();
        fs::write(
            root.join(PROJECT_CONFIG_FILE),
            format!("{{name: demo, root_alternatives: [{}]}}", alt.display()),
        )
        .unwrap();
        let project = load(&root);
        let rel = project.relpath(&alt.join("sub/x.bin")).unwrap();
        assert_eq!(rel, PathBuf::from("sub/x.bin"));
    }

    #[test]
    fn test_scope_walk_nested() {
        let (_dir, root) = fixture();
        let project = load(&root);
        let scope = project.load_scope(Path::new("sub/data/x.bin")).unwrap();
        assert_eq!(scope.config_file(), root.join("sub").join(SCOPE_CONFIG_FILE));
        let parent = scope.parent().unwrap();
        assert_eq!(parent.config_file(), root.join(SCOPE_CONFIG_FILE));
    }

    #[test]
    fn test_scope_walk_uncovered_dir_uses_root() {
        let (_dir, root) = fixture();
        let project = load(&root);
        let scope = project.load_scope(Path::new("files/root.bin")).unwrap();
        assert_eq!(scope.config_file(), root.join(SCOPE_CONFIG_FILE));
    }

    #[test]
    fn test_scope_memoized() {
        let (_dir, root) = fixture();
        let project = load(&root);
        let a = project.load_scope(Path::new("sub/data/x.bin")).unwrap();
        let b = project.load_scope(Path::new("sub/data/y.bin")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_resolve_remote_inherits_overlay() {
        let (_dir, root) = fixture();
        let project = load(&root);
        let remote = project.resolve_remote(Path::new("sub/data/x.bin")).unwrap();
        assert_eq!(remote.chain_names(), vec!["subremote", "main"]);
    }

    #[test]
    fn test_debug_dump_names_config_files() {
        let (_dir, root) = fixture();
        let project = load(&root);
        let remote = project.resolve_remote(Path::new("sub/data/x.bin")).unwrap();
        let dump = project.debug_dump_remote_config(&remote);
        assert_eq!(dump["name"], "subremote");
        assert!(dump["config_file"]
            .as_str()
            .unwrap()
            .ends_with("sub/.exdata.yml"));
        assert_eq!(dump["overlay"]["name"], "main");
    }

    #[test]
    fn test_adhoc_remote() {
        let (_dir, root) = fixture();
        let project = load(&root);
        let config: crate::config::RemoteConfig =
            serde_yaml::from_str("{backend: mock, dir: files, upload_dir: upload}").unwrap();
        let remote = project.resolve_adhoc_remote(config).unwrap();
        assert_eq!(remote.name(), "command_line");
    }

    #[test]
    fn test_missing_root_scope_config() {
        let (_dir, root) = fixture();
        fs::remove_file(root.join(SCOPE_CONFIG_FILE)).unwrap();
        let project = load(&root);
        let err = project.load_scope(Path::new("files/root.bin")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }
}
