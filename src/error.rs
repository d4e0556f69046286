//! Error types for Telos
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Telos
#[derive(Debug, Error)]
pub enum TelosError {
    /// PRD file missing, unreadable or unparseable
    #[error("PRD error: {0}")]
    Prd(String),

    /// Progress log unreadable or an append would break ordering
    #[error("Progress log error: {0}")]
    ProgressLog(String),

    /// Knowledge base unreadable or malformed
    #[error("Knowledge base error: {0}")]
    Knowledge(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Agent runtime error that escaped the subagent boundary
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Prompt template failed to render
    #[error("Template error: {0}")]
    Template(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TelosError {
    /// True when the error means build state can no longer be trusted.
    ///
    /// These end a run immediately instead of being absorbed as a denial.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            TelosError::Prd(_)
                | TelosError::ProgressLog(_)
                | TelosError::Knowledge(_)
                | TelosError::Store(_)
                | TelosError::InvalidState(_)
                | TelosError::Io(_)
                | TelosError::Json(_)
        )
    }
}

/// Result type alias for Telos operations
pub type Result<T> = std::result::Result<T, TelosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prd_error() {
        let err = TelosError::Prd("01-setup.md: unreadable".to_string());
        assert_eq!(err.to_string(), "PRD error: 01-setup.md: unreadable");
    }

    #[test]
    fn test_progress_log_error() {
        let err = TelosError::ProgressLog("expected iteration 4, got 6".to_string());
        assert_eq!(err.to_string(), "Progress log error: expected iteration 4, got 6");
    }

    #[test]
    fn test_invalid_state_error() {
        let err = TelosError::InvalidState("run already completed".to_string());
        assert_eq!(err.to_string(), "Invalid state: run already completed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TelosError = io_err.into();
        assert!(matches!(err, TelosError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: TelosError = json_err.into();
        assert!(matches!(err, TelosError::Json(_)));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(TelosError::Prd("x".into()).is_fatal_to_run());
        assert!(TelosError::Store("x".into()).is_fatal_to_run());
        assert!(!TelosError::Runtime("x".into()).is_fatal_to_run());
        assert!(!TelosError::Template("x".into()).is_fatal_to_run());
        assert!(!TelosError::Config("x".into()).is_fatal_to_run());
    }
}
