use cytolab_core::EngineError;
use uuid::Uuid;

/// Errors surfaced by the session layer. Adds the registry-level concerns
/// (unknown tokens, export failures) on top of the core engine taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session is registered under the token.
    #[error("Project {0} not found")]
    NotFound(Uuid),

    /// The core engine rejected the call.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An off-thread render task failed to complete.
    #[error("Render failed: {0}")]
    Render(String),

    /// The finish-time export hook failed. The project stays finished.
    #[error("Export failed: {0}")]
    Export(String),
}

impl SessionError {
    /// Whether the caller can correct the request, as opposed to an internal
    /// defect that should be logged with full detail.
    pub fn is_user_error(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Engine(e) => e.is_user_error(),
            Self::Render(_) | Self::Export(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_pass_through_transparently() {
        let err = SessionError::from(EngineError::ProjectFinished);
        assert_eq!(err.to_string(), "Project is finished and read-only");
        assert!(err.is_user_error());
    }

    #[test]
    fn internal_errors_are_not_user_errors() {
        assert!(!SessionError::Export("disk full".into()).is_user_error());
        assert!(!SessionError::Render("task cancelled".into()).is_user_error());
        assert!(SessionError::NotFound(Uuid::nil()).is_user_error());
    }
}
