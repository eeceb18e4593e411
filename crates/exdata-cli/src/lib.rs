//! # exdata-cli — Command-Line Interface
//!
//! The `exdata` binary: locates the governing project from the working
//! directory (or `--project-root-guess`), then dispatches to one of the
//! file-oriented subcommands.
//!
//! ## Subcommands
//!
//! - `download` — materialize tracked files from their digest sidecars
//! - `upload` — publish files to their responsible remotes
//! - `check` — verify remotes still hold tracked content
//!
//! ## Crate Policy
//!
//! - CLI construction (argument parsing) is separated from business logic.
//! - Handler functions delegate to `exdata-transfer` — no resolution or
//!   transfer logic lives here.

pub mod check;
pub mod download;
pub mod upload;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use exdata_project::{Project, ProjectOptions, RemoteConfig};
use exdata_remote::Remote;
use exdata_transfer::TransferEngine;

/// Flags shared by every subcommand.
#[derive(clap::Args, Debug)]
pub struct GlobalArgs {
    /// File path used to locate the project root.
    #[arg(long, global = true, default_value = ".")]
    pub project_root_guess: PathBuf,

    /// Override the user configuration file (useful for testing).
    #[arg(long, global = true)]
    pub user_config: Option<PathBuf>,

    /// Keep going after a per-file failure.
    #[arg(short = 'k', long, global = true)]
    pub keep_going: bool,

    /// Dump resolved remote configuration while working.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// YAML configuration for an override remote, bypassing scope
    /// resolution. Useful for direct, single-file downloads.
    #[arg(long, global = true)]
    pub remote: Option<String>,
}

/// Loaded per-invocation state: the project plus the global flags.
pub struct Context {
    pub project: Project,
    pub remote_override: Option<Arc<Remote>>,
    pub verbose: bool,
    pub keep_going: bool,
}

impl Context {
    /// Load the project governing the root guess and resolve the
    /// `--remote` override, if any.
    pub fn load(global: &GlobalArgs) -> anyhow::Result<Self> {
        let guess = absolute(&global.project_root_guess)?;
        let project = Project::load(
            &guess,
            ProjectOptions {
                user_config_file: global.user_config.clone(),
                backend_extensions: Vec::new(),
            },
        )
        .with_context(|| format!("loading project from '{}'", guess.display()))?;

        let remote_override = match &global.remote {
            Some(text) => {
                let config: RemoteConfig =
                    serde_yaml::from_str(text).context("parsing --remote configuration")?;
                Some(project.resolve_adhoc_remote(config)?)
            }
            None => None,
        };

        tracing::debug!(
            project = %project.name(),
            root = %project.root().display(),
            override_remote = remote_override.is_some(),
            "context ready"
        );
        Ok(Self {
            project,
            remote_override,
            verbose: global.verbose,
            keep_going: global.keep_going,
        })
    }

    /// A transfer engine over this context's project, with the remote
    /// override applied.
    pub fn engine(&self) -> TransferEngine<'_> {
        let mut engine = TransferEngine::new(&self.project);
        if let Some(remote) = &self.remote_override {
            engine = engine.with_remote_override(remote.clone());
        }
        engine
    }
}

/// Resolve a possibly-relative CLI path against the working directory.
pub fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("resolving working directory")?
        .join(path))
}

/// Run `action` over each item, honoring `--keep-going`: failures are
/// reported and counted instead of aborting, and the command still exits
/// nonzero if any occurred.
pub fn run_each<T>(
    items: &[T],
    keep_going: bool,
    mut action: impl FnMut(&T) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let mut failures = 0usize;
    for item in items {
        if let Err(err) = action(item) {
            if !keep_going {
                return Err(err);
            }
            eprintln!("{err:#}");
            eprintln!("Continuing (--keep-going).");
            failures += 1;
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} operation(s) failed");
    }
    Ok(())
}
