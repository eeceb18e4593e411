//! # exdata-remote — Storage Backends and the Overlay Chain
//!
//! Defines the pluggable storage surface of the engine:
//!
//! - [`Backend`] — the capability trait one storage mechanism implements
//!   (`has`/`fetch`/`put`, keyed by digest).
//! - [`BackendRegistry`] — the explicit `tag -> factory` table, seeded
//!   from built-ins and extended by one optional host callback. No code
//!   execution at config-load time.
//! - [`MockBackend`] — the built-in directory-backed backend, used both
//!   in tests and as the `mock` config tag.
//! - [`Remote`] — a named backend plus an optional overlay (fallback)
//!   remote, walked strictly outward on `NotFound`.
//!
//! ## Crate Policy
//!
//! - The digest is the authoritative key everywhere; project-relative
//!   paths are advisory metadata a backend may use for layout or logs.
//! - Overlay fallback branches on [`TransferError::NotFound`] only.
//!   Any other backend failure stops the chain.
//!
//! [`TransferError::NotFound`]: exdata_core::TransferError::NotFound

pub mod backend;
pub mod mock;
pub mod remote;

pub use backend::{Backend, BackendContext, BackendFactory, BackendRegistry};
pub use mock::MockBackend;
pub use remote::Remote;
