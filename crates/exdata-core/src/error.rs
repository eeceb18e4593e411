//! # Error Types — Structured Error Hierarchy
//!
//! Defines the error kinds shared across the engine. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Configuration errors are fatal and surfaced immediately; there is
//!   no retry path for a malformed remote graph.
//! - `TransferError::NotFound` is the one variant a `Remote` treats as
//!   "try the overlay". Every other transfer failure stops the chain.
//! - Digest mismatches carry both digests and the offending path so the
//!   diagnostic names what was expected and what was found.

use std::path::PathBuf;

use thiserror::Error;

use crate::digest::HashRef;

/// Error while computing, comparing, or round-tripping a digest.
#[derive(Error, Debug)]
pub enum DigestError {
    /// Reading the file (or its sidecar) failed.
    #[error("io error for {path}: {source}")]
    Io {
        /// The file that could not be read or written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file's bytes do not match the expected digest.
    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    Mismatch {
        /// The digest the caller expected.
        expected: Box<HashRef>,
        /// The digest actually computed.
        actual: Box<HashRef>,
        /// The file that was hashed.
        path: PathBuf,
    },

    /// A sidecar file contained no digest value.
    #[error("sidecar value is empty")]
    EmptySidecarValue,
}

/// Error in the configuration layer: project, scope, or remote graph.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A remote name was referenced that the scope does not declare.
    ///
    /// Remote-name lookup never falls through to parent scopes; a name
    /// either exists locally or the lookup fails.
    #[error("unknown remote '{name}'")]
    UnknownRemote {
        /// The unresolved remote name.
        name: String,
    },

    /// The overlay/remote reference graph contains a cycle.
    #[error("remote reference cycle detected: {}", stack.join(" -> "))]
    RemoteCycle {
        /// The in-progress resolution stack at the point of the revisit.
        stack: Vec<String>,
    },

    /// `".."` was referenced from the project-root scope, which has no parent.
    #[error("'..' remote referenced at the project root scope")]
    ParentAtRoot,

    /// A backend tag has no registered factory.
    #[error("unknown backend tag '{tag}'")]
    UnknownBackend {
        /// The unresolved backend tag.
        tag: String,
    },

    /// A host extension hook tried to re-register an existing backend tag.
    #[error("backend tag '{tag}' registered twice")]
    DuplicateBackend {
        /// The colliding backend tag.
        tag: String,
    },

    /// A required configuration file is missing.
    #[error("missing config file: {path}")]
    MissingFile {
        /// The expected config-file path.
        path: PathBuf,
    },

    /// A configuration file failed to parse.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// The config file that failed to parse.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A config field has an invalid value (wrong shape, bad key, etc.).
    #[error("invalid config in {path}: {reason}")]
    Invalid {
        /// The config file containing the bad value.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Reading a configuration file failed.
    #[error("io error for {path}: {source}")]
    Io {
        /// The config file that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Error mapping a path into or out of a project.
#[derive(Error, Debug)]
pub enum PathError {
    /// The path is outside the project root and all root alternatives.
    #[error("path is not inside the project: {path}")]
    OutsideProject {
        /// The offending path.
        path: PathBuf,
    },

    /// An absolute path was required.
    #[error("expected an absolute path: {path}")]
    NotAbsolute {
        /// The offending path.
        path: PathBuf,
    },

    /// A project-relative path was required.
    #[error("expected a project-relative path: {path}")]
    NotRelative {
        /// The offending path.
        path: PathBuf,
    },
}

/// Error from a backend transfer operation (`has`/`fetch`/`put`).
#[derive(Error, Debug)]
pub enum TransferError {
    /// The backend does not hold this hash. A `Remote` treats this as
    /// "try the overlay"; with no overlay it propagates to the caller.
    #[error("{backend} does not have {hash}")]
    NotFound {
        /// A short description of the backend consulted.
        backend: String,
        /// The digest that was requested.
        hash: HashRef,
    },

    /// The backend does not support uploading.
    #[error("backend '{backend}' does not support uploading")]
    UploadUnsupported {
        /// A short description of the backend.
        backend: String,
    },

    /// The backend failed in a way that is not "not found". Fatal; the
    /// overlay chain is not consulted.
    #[error("backend '{backend}' failed: {message}")]
    Backend {
        /// A short description of the backend.
        backend: String,
        /// Backend-specific failure detail.
        message: String,
    },

    /// Local filesystem IO failed during a transfer.
    #[error("transfer io error: {0}")]
    Io(#[from] std::io::Error),

    /// A fetched file failed digest verification.
    #[error(transparent)]
    Digest(#[from] DigestError),
}
