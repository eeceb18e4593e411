//! # exdata-project — Hierarchical Configuration Resolution
//!
//! Maps project files to the remotes responsible for them:
//!
//! - [`config`] — serde model for the scope/project/user config files,
//!   project-root discovery, and the deep user-config merge.
//! - [`scope`] — the per-subtree `Scope` node: lazy remote construction
//!   with cycle detection, `".."` parent inheritance, file overrides.
//! - [`project`] — the `Project` context: canonical path mapping, the
//!   scope cache keyed by config-file identity, the backend registry.
//!
//! ## Crate Policy
//!
//! - Configuration is immutable once parsed; scopes and remotes are
//!   memoized for the project's lifetime, never evicted or reloaded.
//! - No ambient globals: every operation goes through an explicit
//!   `Project` instance.

pub mod config;
pub mod project;
pub mod scope;

pub use config::{
    ProjectConfig, RemoteConfig, ScopeConfig, UserConfig, PROJECT_CONFIG_FILE, SCOPE_CONFIG_FILE,
};
pub use project::{Project, ProjectOptions};
pub use scope::{ResolveEnv, Scope};
