//! Error types for the cache crate

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (file operations, locking, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io(format!("failed to replace cache file: {}", err.error))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Serialization(err.to_string())
    }
}
