//! Error types for modpatch

use thiserror::Error;

/// Main error type for modpatch operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("no diff path found: {0}")]
    NoPathFound(String),

    #[error("package operation failed: {0}")]
    PackageOperation(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid-stage error
    pub fn invalid_stage(msg: impl Into<String>) -> Self {
        Error::InvalidStage(msg.into())
    }

    /// Create a no-path-found error
    pub fn no_path_found(msg: impl Into<String>) -> Self {
        Error::NoPathFound(msg.into())
    }

    /// Create a package-operation error
    pub fn package_operation(msg: impl Into<String>) -> Self {
        Error::PackageOperation(msg.into())
    }

    /// Create a busy error
    pub fn busy(msg: impl Into<String>) -> Self {
        Error::Busy(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Machine-readable kind discriminant, stable across releases.
    /// Clients key retry behavior off this string.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidStage(_) => "invalid_stage",
            Error::NoPathFound(_) => "no_path_found",
            Error::PackageOperation(_) => "package_operation_failed",
            Error::Busy(_) => "busy",
            Error::MalformedMessage(_) => "malformed_message",
            Error::NotFound(_) => "not_found",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
