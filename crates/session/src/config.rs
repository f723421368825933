use std::time::Duration;

use cytolab_core::undo::DEFAULT_UNDO_DEPTH;

/// Registry tuning loaded from environment variables.
///
/// All fields have defaults suitable for local development and tests.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Undo/redo history depth per project (default: `64`).
    pub undo_depth: usize,
    /// Rendered-PNG cache entries per session (default: `32`).
    pub render_cache: usize,
    /// How long a finished session stays queryable before eviction
    /// (default: one hour).
    pub finished_ttl: Duration,
    /// How often the eviction loop wakes up (default: `60` seconds).
    pub eviction_interval: Duration,
}

impl RegistryConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `CYTOLAB_UNDO_DEPTH`             | `64`    |
    /// | `CYTOLAB_RENDER_CACHE`           | `32`    |
    /// | `CYTOLAB_FINISHED_TTL_SECS`      | `3600`  |
    /// | `CYTOLAB_EVICTION_INTERVAL_SECS` | `60`    |
    pub fn from_env() -> Self {
        let undo_depth: usize = std::env::var("CYTOLAB_UNDO_DEPTH")
            .unwrap_or_else(|_| DEFAULT_UNDO_DEPTH.to_string())
            .parse()
            .expect("CYTOLAB_UNDO_DEPTH must be a valid usize");

        let render_cache: usize = std::env::var("CYTOLAB_RENDER_CACHE")
            .unwrap_or_else(|_| "32".into())
            .parse()
            .expect("CYTOLAB_RENDER_CACHE must be a valid usize");

        let finished_ttl_secs: u64 = std::env::var("CYTOLAB_FINISHED_TTL_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("CYTOLAB_FINISHED_TTL_SECS must be a valid u64");

        let eviction_interval_secs: u64 = std::env::var("CYTOLAB_EVICTION_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("CYTOLAB_EVICTION_INTERVAL_SECS must be a valid u64");

        Self {
            undo_depth,
            render_cache,
            finished_ttl: Duration::from_secs(finished_ttl_secs),
            eviction_interval: Duration::from_secs(eviction_interval_secs),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            undo_depth: DEFAULT_UNDO_DEPTH,
            render_cache: 32,
            finished_ttl: Duration::from_secs(3600),
            eviction_interval: Duration::from_secs(60),
        }
    }
}
