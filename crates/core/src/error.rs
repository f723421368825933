#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Index out of bounds: {what} {index} exceeds extent {extent}")]
    OutOfBounds {
        what: &'static str,
        index: usize,
        extent: usize,
    },

    #[error("Project is finished and read-only")]
    ProjectFinished,

    #[error("Apply failed and was rolled back: {0}")]
    Apply(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

impl EngineError {
    /// Whether the error is correctable by the caller (bad parameters, bad
    /// indices, calls against a finished project) as opposed to an internal
    /// defect that should be logged with full detail.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::OutOfBounds { .. } | Self::ProjectFinished
        )
    }
}
