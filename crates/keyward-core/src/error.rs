//! Error types for Keyward directory operations.
//!
//! Every failure inside the directory engine surfaces as a
//! [`DirectoryError`] carrying the directory's native error text and result
//! code; configuration problems are caught before any network I/O and
//! reported as validation errors.

use serde::Serialize;
use thiserror::Error;

use crate::codes::ResultCode;

/// A failure reported by, or while talking to, the directory service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}: {native_message} [{code}]")]
pub struct DirectoryError {
    message: String,
    native_message: String,
    code: ResultCode,
    cause: Option<String>,
}

impl DirectoryError {
    /// Creates a directory error from a native result.
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        native_message: impl Into<String>,
        code: ResultCode,
    ) -> Self {
        Self {
            message: message.into(),
            native_message: native_message.into(),
            code,
            cause: None,
        }
    }

    /// Attaches the underlying cause description.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Human-readable message describing the failed operation.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The directory's native error text.
    #[must_use]
    pub fn native_message(&self) -> &str {
        &self.native_message
    }

    /// The classified native result code.
    #[must_use]
    pub const fn code(&self) -> ResultCode {
        self.code
    }

    /// The wrapped cause, when one was recorded.
    #[must_use]
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }
}

/// Main error type for Keyward operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed configuration, rejected before any network I/O
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Operation timed out
    #[error("Timeout waiting for directory: {0}")]
    Timeout(String),

    /// Requested capability has no implementation
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Failure reported by the directory service
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Specialized result type for Keyward operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::Directory(_) => "DIRECTORY_ERROR",
        }
    }

    /// Returns the native directory result code when this error carries one.
    #[must_use]
    pub const fn directory_code(&self) -> Option<ResultCode> {
        match self {
            Self::Directory(err) => Some(err.code()),
            _ => None,
        }
    }

    /// Converts the error into a serializable detail record.
    #[must_use]
    pub fn into_error_detail(self) -> ErrorDetail {
        ErrorDetail {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(self, Self::ConfigError(_) | Self::Directory(_))
    }
}

// Conversions from external error types
impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_error_display_carries_native_context() {
        let err = DirectoryError::new(
            "bind failed",
            "80090308: LdapErr: DSID-0C090439",
            ResultCode::InvalidCredentials,
        );
        assert_eq!(
            err.to_string(),
            "bind failed: 80090308: LdapErr: DSID-0C090439 [INVALID_CREDENTIALS (49)]"
        );
    }

    #[test]
    fn directory_error_cause_round_trip() {
        let err = DirectoryError::new("search failed", "", ResultCode::OperationsError)
            .with_cause("connection reset by peer");
        assert_eq!(err.cause(), Some("connection reset by peer"));
    }

    #[test]
    fn error_codes() {
        assert_eq!(
            Error::ValidationError("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            Error::ConfigError("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(Error::Timeout("test".to_string()).error_code(), "TIMEOUT");
        assert_eq!(
            Error::NotImplemented("test".to_string()).error_code(),
            "NOT_IMPLEMENTED"
        );
        assert_eq!(
            Error::from(DirectoryError::new("x", "y", ResultCode::Success)).error_code(),
            "DIRECTORY_ERROR"
        );
    }

    #[test]
    fn directory_code_is_exposed_through_the_wrapper() {
        let err = Error::from(DirectoryError::new(
            "no such group",
            "No Such Object",
            ResultCode::NoSuchObject,
        ));
        assert_eq!(err.directory_code(), Some(ResultCode::NoSuchObject));
        assert_eq!(Error::Timeout("t".to_string()).directory_code(), None);
    }

    #[test]
    fn into_error_detail_serializes() {
        let detail = Error::ValidationError("server is empty".to_string()).into_error_detail();
        let json = serde_json::to_string(&detail).unwrap();
        assert!(json.contains("VALIDATION_ERROR"));
        assert!(json.contains("server is empty"));
    }

    #[test]
    fn should_log_flags_directory_and_config_errors() {
        assert!(Error::ConfigError("test".to_string()).should_log());
        assert!(Error::from(DirectoryError::new("x", "y", ResultCode::OperationsError)).should_log());
        assert!(!Error::ValidationError("test".to_string()).should_log());
        assert!(!Error::Timeout("test".to_string()).should_log());
    }

    #[test]
    fn from_validator_errors() {
        let mut errors = validator::ValidationErrors::new();
        errors.add("server", validator::ValidationError::new("length"));
        let err: Error = errors.into();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[test]
    fn from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let keyward_err: Error = err.into();
        assert!(matches!(keyward_err, Error::ValidationError(_)));
    }
}
