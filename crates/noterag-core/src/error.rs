use thiserror::Error;

/// Failure taxonomy shared by every crate in the workspace.
///
/// Corpus errors are recoverable per note; store and provider errors fail the
/// operation in progress; state errors are precondition violations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read note {path}: {message}")]
    Corpus { path: String, message: String },

    #[error("vector store error: {0}")]
    Store(String),

    #[error("embedding provider unavailable: {0}")]
    Provider(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index not ready: {0}")]
    NotReady(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("index manifest error: {0}")]
    Manifest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn corpus(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Corpus { path: path.into(), message: message.to_string() }
    }

    pub fn store(err: impl ToString) -> Self {
        Self::Store(err.to_string())
    }

    pub fn provider(err: impl ToString) -> Self {
        Self::Provider(err.to_string())
    }

    /// True for calls made in the wrong lifecycle state rather than data failures.
    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }

    /// Dimension mismatches are recoverable by rebuilding the index.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
