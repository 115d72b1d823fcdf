//! Core error types for mounted uploaders
//!
//! Every failure an uploader can raise is an `UploadError`. The mounter
//! sorts those failures into categories and decides, per category, whether
//! to record-and-continue or record-and-propagate.

use thiserror::Error;

/// Failure categories the mounter tracks independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Input rejected by validation (wrong extension, too large, ...)
    Integrity,
    /// Post-ingest transformation failed
    Processing,
    /// Remote fetch failed
    Download,
    /// Malformed serialized token
    InvalidParameter,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integrity => "integrity",
            Self::Processing => "processing",
            Self::Download => "download",
            Self::InvalidParameter => "invalid_parameter",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage backend errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(err.to_string()),
            _ => StorageError::Io(err.to_string()),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by uploaders and surfaced through the mounter
///
/// `Clone` so the mounter can keep the last failure of each category while
/// also handing it back to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type UploadResult<T> = Result<T, UploadError>;

impl UploadError {
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing(message.into())
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::Download(message.into())
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Category this error belongs to; storage failures have none and are
    /// always propagated.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Integrity(_) => Some(ErrorCategory::Integrity),
            Self::Processing(_) => Some(ErrorCategory::Processing),
            Self::Download(_) => Some(ErrorCategory::Download),
            Self::InvalidParameter(_) => Some(ErrorCategory::InvalidParameter),
            Self::Storage(_) => None,
        }
    }

    /// Stable code for validation messages on the host record
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Integrity(_) => "integrity_error",
            Self::Processing(_) => "processing_error",
            Self::Download(_) => "download_error",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::Storage(_) => "storage_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            UploadError::integrity("bad extension").category(),
            Some(ErrorCategory::Integrity)
        );
        assert_eq!(
            UploadError::download("timeout").category(),
            Some(ErrorCategory::Download)
        );
        assert_eq!(
            UploadError::Storage(StorageError::NotFound("x".into())).category(),
            None
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: StorageError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, StorageError::NotFound(_)));

        let err: StorageError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn test_error_display() {
        let err = UploadError::processing("resize failed");
        assert_eq!(err.to_string(), "Processing error: resize failed");
        assert_eq!(err.error_code(), "processing_error");
    }
}
