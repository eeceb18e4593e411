//! # Configuration Model
//!
//! Serde structs for the three configuration layers and the helpers that
//! locate and parse them:
//!
//! - **Scope config** (`.exdata.yml`): one per directory subtree; names
//!   remotes, selects one, and may override remotes per file.
//! - **Project config** (`.exdata.project.yml`): the root sentinel; its
//!   location *is* the project root.
//! - **User config** (`~/.config/exdata/config.yml`): cache directory and
//!   other machine-local settings, deep-merged over built-in defaults.
//!
//! Configuration is immutable once parsed; scopes built from it are
//! cached for the project's lifetime and never reloaded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use exdata_core::ConfigError;

/// Scope config file name, one per directory subtree that declares remotes.
pub const SCOPE_CONFIG_FILE: &str = ".exdata.yml";

/// Project root sentinel file name.
pub const PROJECT_CONFIG_FILE: &str = ".exdata.project.yml";

/// Default user config location, relative to the home directory.
pub const USER_CONFIG_RELPATH: &str = ".config/exdata/config.yml";

/// Default cache directory, relative to the home directory.
pub const CACHE_DIR_RELPATH: &str = ".cache/exdata";

/// The special remote name that resolves to the parent scope's selected
/// remote.
pub const PARENT_REMOTE_NAME: &str = "..";

/// One remote's configuration node.
///
/// `backend` and `overlay` are the keys the engine interprets; everything
/// else is backend-specific and passed through opaquely.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Backend tag, looked up in the backend registry.
    pub backend: String,
    /// Optional fallback remote, by name (or `".."` for the parent
    /// scope's selected remote).
    #[serde(default)]
    pub overlay: Option<String>,
    /// Backend-specific keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

impl RemoteConfig {
    /// The full configuration node handed to the backend factory
    /// (backend-specific keys plus the `backend` tag itself).
    pub fn backend_node(&self) -> serde_yaml::Mapping {
        let mut node = self.extra.clone();
        node.insert(
            serde_yaml::Value::from("backend"),
            serde_yaml::Value::from(self.backend.clone()),
        );
        node
    }
}

/// A scope configuration: named remotes, one selected, per-file overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeConfig {
    /// Name of the selected remote for files under this scope.
    pub remote: String,
    /// Named remote declarations.
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteConfig>,
    /// Per-file remote overrides, keyed by path relative to the scope's
    /// directory.
    #[serde(default)]
    pub file_overrides: BTreeMap<String, RemoteConfig>,
}

/// The project configuration stored in the root sentinel file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Project name, used by backends for namespacing and in diagnostics.
    pub name: String,
    /// Extra roots (symlink-aware alternates) a path may be relative to.
    #[serde(default)]
    pub root_alternatives: Vec<PathBuf>,
}

/// Machine-local settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// Core engine settings.
    #[serde(default)]
    pub core: CoreConfig,
}

/// The `core` section of the user config.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    /// Cache directory; `~` expands to the home directory.
    pub cache_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("~").join(CACHE_DIR_RELPATH),
        }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
        }
    }
}

impl UserConfig {
    /// Load the user config: built-in defaults, deep-merged with the file
    /// at `path` if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = serde_yaml::to_value(DefaultUserConfigRepr::new())
            .map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<builtin user config>"),
                source,
            })?;
        if let Some(path) = path {
            if path.is_file() {
                let file_value: serde_yaml::Value = parse_yaml_file(path)?;
                merged = merge_values(merged, file_value);
            }
        }
        let config: UserConfig =
            serde_yaml::from_value(merged).map_err(|source| ConfigError::Parse {
                path: path
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("<builtin user config>")),
                source,
            })?;
        Ok(config)
    }

    /// The cache directory with `~` expanded.
    pub fn cache_dir(&self) -> PathBuf {
        expand_user(&self.core.cache_dir)
    }
}

/// Serializable mirror of the built-in defaults, used as the merge base.
#[derive(serde::Serialize)]
struct DefaultUserConfigRepr {
    core: DefaultCoreRepr,
}

#[derive(serde::Serialize)]
struct DefaultCoreRepr {
    cache_dir: PathBuf,
}

impl DefaultUserConfigRepr {
    fn new() -> Self {
        Self {
            core: DefaultCoreRepr {
                cache_dir: CoreConfig::default().cache_dir,
            },
        }
    }
}

/// The default user-config file path, if the home directory is known.
pub fn default_user_config_file() -> Option<PathBuf> {
    home_dir().map(|home| home.join(USER_CONFIG_RELPATH))
}

/// Deep-merge two YAML values: maps merge recursively, everything else
/// overwrites.
pub fn merge_values(base: serde_yaml::Value, new: serde_yaml::Value) -> serde_yaml::Value {
    match (base, new) {
        (serde_yaml::Value::Mapping(mut base_map), serde_yaml::Value::Mapping(new_map)) => {
            for (key, new_value) in new_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge_values(base_value, new_value),
                    None => new_value,
                };
                base_map.insert(key, merged);
            }
            serde_yaml::Value::Mapping(base_map)
        }
        (_, new) => new,
    }
}

/// Parse a YAML config file into `T`.
pub fn parse_config_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    parse_yaml_file(path)
}

fn parse_yaml_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Expand a leading `~` to the home directory.
pub fn expand_user(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Walk upward from `start` looking for the project sentinel file.
///
/// If the sentinel is a symlink (a build system linked the tree into its
/// own layout), the symlink's directory becomes a root alternative and
/// one level of `readlink` locates the canonical root. More than one
/// level of indirection is rejected.
pub fn find_project_root(guess: &Path) -> Result<(PathBuf, Vec<PathBuf>), ConfigError> {
    let start = exdata_core::path::start_dir(guess);
    let mut dir = Some(start);
    while let Some(cur) = dir {
        let sentinel = cur.join(PROJECT_CONFIG_FILE);
        if sentinel.is_file() {
            let mut alternatives = Vec::new();
            let meta = std::fs::symlink_metadata(&sentinel).map_err(|source| ConfigError::Io {
                path: sentinel.clone(),
                source,
            })?;
            if meta.file_type().is_symlink() {
                alternatives.push(cur.to_path_buf());
                let target = std::fs::read_link(&sentinel).map_err(|source| ConfigError::Io {
                    path: sentinel.clone(),
                    source,
                })?;
                if !target.is_absolute() {
                    return Err(ConfigError::Invalid {
                        path: sentinel,
                        reason: "sentinel symlink must be absolute".to_string(),
                    });
                }
                let target_meta =
                    std::fs::symlink_metadata(&target).map_err(|source| ConfigError::Io {
                        path: target.clone(),
                        source,
                    })?;
                if target_meta.file_type().is_symlink() {
                    return Err(ConfigError::Invalid {
                        path: sentinel,
                        reason: "sentinel symlink must have exactly one level of indirection"
                            .to_string(),
                    });
                }
                let root = target
                    .parent()
                    .ok_or_else(|| ConfigError::Invalid {
                        path: target.clone(),
                        reason: "sentinel target has no parent directory".to_string(),
                    })?
                    .to_path_buf();
                return Ok((root, alternatives));
            }
            return Ok((cur.to_path_buf(), alternatives));
        }
        dir = cur.parent();
    }
    Err(ConfigError::MissingFile {
        path: guess.join(PROJECT_CONFIG_FILE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scope_config_parse() {
        let yaml = "
remote: main
remotes:
  main:
    backend: mock
    dir: files
    upload_dir: upload
  upstream:
    backend: mock
    overlay: main
    dir: upstream_files
    upload_dir: upstream_upload
file_overrides:
  data/special.bin:
    backend: mock
    dir: special
    upload_dir: special_upload
";
        let config: ScopeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.remote, "main");
        assert_eq!(config.remotes.len(), 2);
        assert_eq!(config.remotes["upstream"].overlay.as_deref(), Some("main"));
        assert!(config.remotes["main"].overlay.is_none());
        assert!(config.file_overrides.contains_key("data/special.bin"));

        let node = config.remotes["main"].backend_node();
        assert_eq!(node.get("dir").unwrap().as_str(), Some("files"));
        assert_eq!(node.get("backend").unwrap().as_str(), Some("mock"));
    }

    #[test]
    fn test_project_config_parse() {
        let config: ProjectConfig =
            serde_yaml::from_str("{name: demo, root_alternatives: [/elsewhere]}").unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.root_alternatives, vec![PathBuf::from("/elsewhere")]);

        let minimal: ProjectConfig = serde_yaml::from_str("{name: demo}").unwrap();
        assert!(minimal.root_alternatives.is_empty());
    }

    #[test]
    fn test_merge_values_deep() {
        let base: serde_yaml::Value =
            serde_yaml::from_str("{core: {cache_dir: /a, keep: 1}, top: x}").unwrap();
        let new: serde_yaml::Value = serde_yaml::from_str("{core: {cache_dir: /b}}").unwrap();
        let merged = merge_values(base, new);
        assert_eq!(merged["core"]["cache_dir"], "/b");
        assert_eq!(merged["core"]["keep"], 1);
        assert_eq!(merged["top"], "x");
    }

    #[test]
    fn test_user_config_defaults_and_override() {
        let defaults = UserConfig::load(None).unwrap();
        assert!(defaults.core.cache_dir.ends_with(CACHE_DIR_RELPATH));

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.yml");
        fs::write(&file, "{core: {cache_dir: /custom/cache}}").unwrap();
        let custom = UserConfig::load(Some(&file)).unwrap();
        assert_eq!(custom.core.cache_dir, PathBuf::from("/custom/cache"));
    }

    #[test]
    fn test_missing_user_config_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let config = UserConfig::load(Some(&dir.path().join("absent.yml"))).unwrap();
        assert!(config.core.cache_dir.ends_with(CACHE_DIR_RELPATH));
    }

    #[test]
    fn test_find_project_root_plain() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("proj");
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join(PROJECT_CONFIG_FILE), "{name: demo}").unwrap();

        let (found, alts) = find_project_root(&root.join("sub/deeper")).unwrap();
        assert_eq!(found, root);
        assert!(alts.is_empty());
    }

    #[test]
    fn test_find_project_root_missing() {
        let dir = TempDir::new().unwrap();
        let err = find_project_root(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_find_project_root_through_symlink() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        let linked = dir.path().join("linked");
        fs::create_dir_all(&real).unwrap();
        fs::create_dir_all(&linked).unwrap();
        fs::write(real.join(PROJECT_CONFIG_FILE), "{name: demo}").unwrap();
        std::os::unix::fs::symlink(
            real.join(PROJECT_CONFIG_FILE),
            linked.join(PROJECT_CONFIG_FILE),
        )
        .unwrap();

        let (found, alts) = find_project_root(&linked).unwrap();
        assert_eq!(found, real);
        assert_eq!(alts, vec![linked]);
    }

    #[test]
    fn test_parse_config_file_missing() {
        let dir = TempDir::new().unwrap();
        let err =
            parse_config_file::<ScopeConfig>(&dir.path().join(".exdata.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn test_expand_user() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_user(Path::new("~/.cache/exdata")),
            PathBuf::from("/home/tester/.cache/exdata")
        );
        assert_eq!(expand_user(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
