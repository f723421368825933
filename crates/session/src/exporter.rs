//! Finish-time export hook (PRD-10).
//!
//! When a project is finished, its sealed [`FinalState`] is handed to the
//! registry's [`Exporter`] exactly once. Hosts plug in whatever sink they
//! need; [`JsonExporter`] covers tests and simple single-machine setups,
//! [`NullExporter`] hosts that only want the in-memory result.

use std::path::PathBuf;

use async_trait::async_trait;
use cytolab_core::FinalState;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Writing the export target failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The final state could not be serialized.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Any other sink-specific failure.
    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Exporter
// ---------------------------------------------------------------------------

/// Receives the final arrays of a finished project.
///
/// The registry guarantees at most one call per project. An error leaves the
/// project finished; it is surfaced to the finishing caller and not retried.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, state: &FinalState) -> Result<(), ExportError>;
}

/// Writes `<token>.json` into a directory.
#[derive(Debug, Clone)]
pub struct JsonExporter {
    dir: PathBuf,
}

impl JsonExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Exporter for JsonExporter {
    async fn export(&self, state: &FinalState) -> Result<(), ExportError> {
        let payload = serde_json::to_vec_pretty(state)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.json", state.token));
        tokio::fs::write(&path, payload).await?;
        tracing::info!(token = %state.token, path = %path.display(), "Final state exported");
        Ok(())
    }
}

/// Discards the final state.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExporter;

#[async_trait]
impl Exporter for NullExporter {
    async fn export(&self, _state: &FinalState) -> Result<(), ExportError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cytolab_core::{Buffer2D, EditMode};
    use uuid::Uuid;

    fn final_state() -> FinalState {
        FinalState {
            token: Uuid::new_v4(),
            mode: EditMode::Pixel,
            finished_at: chrono::Utc::now(),
            max_label: 2,
            labels: vec![vec![Buffer2D::from_vec(2, 1, vec![1, 2]).unwrap()]],
            lineage: None,
        }
    }

    #[tokio::test]
    async fn json_exporter_writes_one_file_per_token() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonExporter::new(dir.path());
        let state = final_state();

        exporter.export(&state).await.unwrap();

        let path = dir.path().join(format!("{}.json", state.token));
        let contents = tokio::fs::read(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&contents).unwrap();
        assert_eq!(parsed["token"], state.token.to_string());
        assert_eq!(parsed["max_label"], 2);
    }

    #[tokio::test]
    async fn json_exporter_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("exports").join("cytolab");
        let exporter = JsonExporter::new(&nested);

        exporter.export(&final_state()).await.unwrap();
        assert!(nested.exists());
    }

    #[tokio::test]
    async fn null_exporter_accepts_anything() {
        NullExporter.export(&final_state()).await.unwrap();
    }
}
