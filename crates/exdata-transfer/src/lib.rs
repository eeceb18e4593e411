//! # exdata-transfer — Fetch/Publish/Check Orchestration
//!
//! Ties the lower layers together: a [`TransferEngine`] borrows a
//! loaded project, owns a handle to the shared cache, and exposes the
//! three user-facing operations:
//!
//! - `fetch` — sidecar file in, verified content out, via the cache.
//! - `publish` — content in, uploaded to the responsible remote, sidecar
//!   refreshed.
//! - `check` — confirm the responsible remote (or its overlays) still
//!   holds a tracked file's digest, without touching the cache.
//!
//! ## Crate Policy
//!
//! - All paths entering the engine are absolute; callers resolve the
//!   working directory. Project membership is re-derived here, never
//!   trusted from the caller.
//! - The engine never prints. Failures carry enough context to render
//!   (including the overlay-chain dump for resolution errors); the CLI
//!   decides presentation.

pub mod engine;

use std::path::PathBuf;

use exdata_cache::CacheError;
use exdata_core::{ConfigError, DigestError, HashRef, PathError, TransferError};

pub use engine::{CheckFile, FetchOptions, FetchOutcome, PublishReport, TransferEngine};

/// Top-level error for transfer operations, converting from every
/// layer below plus the input-validation failures introduced here.
#[derive(Debug, thiserror::Error)]
pub enum ExdataError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A fetch input that does not carry the sidecar suffix.
    #[error("not a digest sidecar file (expected '{suffix}' suffix): {path}")]
    NotSidecarFile { path: PathBuf, suffix: &'static str },

    /// A publish input that is itself a sidecar file.
    #[error("input is a digest sidecar file; did you mean to upload '{data_path}'?")]
    SidecarInput { path: PathBuf, data_path: PathBuf },

    /// Fetch refuses to clobber an existing output without `--force`.
    #[error("output file already exists: {path} (use --force to overwrite)")]
    OutputExists { path: PathBuf },

    /// The responsible remote chain does not hold the recorded digest.
    /// `chain` carries the remote-config dump for diagnostics.
    #[error("remote '{remote}' does not have '{relpath}' ({hash})")]
    RemoteMissing {
        remote: String,
        relpath: PathBuf,
        hash: HashRef,
        chain: serde_json::Value,
    },

    #[error("i/o failure at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
