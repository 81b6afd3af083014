use thiserror::Error;

/// Geotrail error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeotrailError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error("Session not running")]
    NotRunning,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File not found: {0}")]
    MissingFile(String),

    #[error("Image codec error: {0}")]
    Codec(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GeotrailError {
    /// Wrap an I/O failure on `path` as a storage error
    pub fn storage(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        GeotrailError::Storage(format!("{}: {}", path.display(), err))
    }

    /// Configuration errors are the only ones surfaced synchronously to callers
    pub fn is_config_error(&self) -> bool {
        matches!(self, GeotrailError::InvalidConfig(_))
    }
}

/// Result type for pipeline operations
pub type CaptureResult<T> = Result<T, GeotrailError>;
