//! Error types for locodata.
//!
//! One enum covers every failure category in the pipeline. The variants mirror
//! how a failure is handled: configuration errors abort a run, I/O and chunking
//! errors skip a file, backend errors are retried or fail a task, validation
//! errors trigger a repair pass, and writer errors fail a single task.

use thiserror::Error;

/// Unified error type for locodata.
///
/// All library functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or unusable configuration. The only category that is fatal to a run.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Every chunking strategy failed for a file
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// Backend failure worth retrying (rate limit, timeout, truncated output)
    #[error("Transient backend error: {0}")]
    BackendTransient(String),

    /// Backend failure that will not succeed on retry
    #[error("Permanent backend error: {0}")]
    BackendPermanent(String),

    /// Backend output did not match the expected shape
    #[error("Validation error: {0}")]
    Validation(String),

    /// Artifact store append failed
    #[error("Writer error: {0}")]
    Writer(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the failure may succeed if the same call is repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::BackendTransient(_))
    }

    /// Short stable label for reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Chunking(_) => "chunking",
            AppError::BackendTransient(_) => "backend_transient",
            AppError::BackendPermanent(_) => "backend_permanent",
            AppError::Validation(_) => "validation",
            AppError::Writer(_) => "writer",
            AppError::Prompt(_) => "prompt",
            AppError::Serialization(_) => "serialization",
            AppError::Other(_) => "other",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_backend_errors_retry() {
        assert!(AppError::BackendTransient("429".into()).is_transient());
        assert!(!AppError::BackendPermanent("400".into()).is_transient());
        assert!(!AppError::Validation("missing answer".into()).is_transient());
    }

    #[test]
    fn test_kind_labels() {
        let io = AppError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.kind(), "io");
        assert_eq!(AppError::Writer("disk full".into()).kind(), "writer");
    }
}
