//! # exdata-core — Foundational Types for the exdata Engine
//!
//! This crate is the leaf of the workspace DAG. It defines the
//! algorithm-tagged content digest (`HashRef`), the plain-text sidecar
//! hash-file format, the shared error hierarchy, and small path helpers
//! used by every other crate.
//!
//! ## Key Design Principles
//!
//! 1. **`HashRef` is the authoritative key.** Everything a remote or the
//!    cache does is keyed by `(algorithm, hex value)`. Project-relative
//!    paths are advisory metadata only.
//!
//! 2. **Explicit empty sentinel.** A file that has never been hashed is
//!    represented by `HashRef::empty()`, never by an empty string smuggled
//!    through a "computed" digest.
//!
//! 3. **Structured error kinds.** "Not found here, try the overlay" is a
//!    distinct `TransferError` variant, not an exception used for control
//!    flow. Callers branch on kinds deliberately.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `exdata-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod path;

pub use digest::{HashAlgorithm, HashRef};
pub use error::{ConfigError, DigestError, PathError, TransferError};
pub use path::is_child_path;
