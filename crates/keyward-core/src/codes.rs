//! Native directory result codes.
//!
//! The directory reports the outcome of every bind and search with a numeric
//! result code. The engine only interprets the handful of codes that drive
//! authentication decisions; everything else is carried through untouched so
//! callers and logs retain the native value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directory result codes the engine classifies failures by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    /// The operation completed successfully (0).
    Success,
    /// The server encountered an internal error or the operation was
    /// attempted out of sequence (1).
    OperationsError,
    /// The requested authentication method is not supported (7).
    AuthMethodNotSupported,
    /// The server requires stronger authentication (8).
    StrongerAuthRequired,
    /// The operation requires a confidential transport (13).
    ConfidentialityRequired,
    /// The targeted entry does not exist (32).
    NoSuchObject,
    /// The supplied credentials were rejected (49).
    InvalidCredentials,
    /// The search filter was malformed (87).
    FilterError,
    /// Any other native code, preserved verbatim.
    Other(i32),
}

impl ResultCode {
    /// Classifies a native numeric code.
    #[must_use]
    pub const fn from_native(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::OperationsError,
            7 => Self::AuthMethodNotSupported,
            8 => Self::StrongerAuthRequired,
            13 => Self::ConfidentialityRequired,
            32 => Self::NoSuchObject,
            49 => Self::InvalidCredentials,
            87 => Self::FilterError,
            other => Self::Other(other),
        }
    }

    /// Returns the native numeric code.
    #[must_use]
    pub const fn native(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::OperationsError => 1,
            Self::AuthMethodNotSupported => 7,
            Self::StrongerAuthRequired => 8,
            Self::ConfidentialityRequired => 13,
            Self::NoSuchObject => 32,
            Self::InvalidCredentials => 49,
            Self::FilterError => 87,
            Self::Other(code) => *code,
        }
    }

    /// Returns true when the code reports an authentication failure, as
    /// opposed to a transport or query problem.
    ///
    /// Callers use this to decide whether falling back to another credential
    /// source makes sense.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::AuthMethodNotSupported
                | Self::StrongerAuthRequired
                | Self::ConfidentialityRequired
        )
    }

    /// Short symbolic name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::OperationsError => "OPERATIONS_ERROR",
            Self::AuthMethodNotSupported => "AUTH_METHOD_NOT_SUPPORTED",
            Self::StrongerAuthRequired => "STRONGER_AUTH_REQUIRED",
            Self::ConfidentialityRequired => "CONFIDENTIALITY_REQUIRED",
            Self::NoSuchObject => "NO_SUCH_OBJECT",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::FilterError => "FILTER_ERROR",
            Self::Other(_) => "OTHER",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.native())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_enumerated_codes() {
        for code in [0, 1, 7, 8, 13, 32, 49, 87] {
            assert_eq!(ResultCode::from_native(code).native(), code);
        }
    }

    #[test]
    fn preserves_unknown_codes() {
        let code = ResultCode::from_native(53);
        assert_eq!(code, ResultCode::Other(53));
        assert_eq!(code.native(), 53);
        assert_eq!(code.name(), "OTHER");
    }

    #[test]
    fn classifies_auth_failures() {
        assert!(ResultCode::InvalidCredentials.is_auth_failure());
        assert!(ResultCode::StrongerAuthRequired.is_auth_failure());
        assert!(ResultCode::ConfidentialityRequired.is_auth_failure());
        assert!(!ResultCode::NoSuchObject.is_auth_failure());
        assert!(!ResultCode::Success.is_auth_failure());
        assert!(!ResultCode::Other(80).is_auth_failure());
    }

    #[test]
    fn display_includes_name_and_native_code() {
        assert_eq!(
            ResultCode::InvalidCredentials.to_string(),
            "INVALID_CREDENTIALS (49)"
        );
    }
}
