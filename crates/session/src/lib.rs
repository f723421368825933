//! Async session layer over the `cytolab-core` engine.
//!
//! This crate turns the synchronous engine into a multi-project service
//! (PRD-08, PRD-10):
//!
//! - [`SessionRegistry`] — token → live project map; create, apply, undo,
//!   redo, render, query, finish, remove, and background eviction of
//!   finished sessions.
//! - [`Session`] — per-project serialization point with a revision-tagged
//!   render cache, so stale renders are returned but never cached.
//! - [`Exporter`] — finish-time handoff of the sealed arrays, called exactly
//!   once per project.
//! - [`RegistryConfig`] — env-driven tuning (undo depth, cache size, TTLs).
//! - [`telemetry`] — tracing bootstrap.

pub mod config;
pub mod error;
pub mod exporter;
pub mod registry;
pub mod session;
pub mod telemetry;

pub use config::RegistryConfig;
pub use error::SessionError;
pub use exporter::{ExportError, Exporter, JsonExporter, NullExporter};
pub use registry::SessionRegistry;
pub use session::Session;
