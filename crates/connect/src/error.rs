//! Error types for the connect crate.

use ledgerdeck_core::errors::{Error, RemoteError};
use thiserror::Error;

/// Result type alias for connect operations.
pub type Result<T> = std::result::Result<T, ConnectError>;

/// Retry policy class for API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

#[derive(Debug, Error)]
pub enum ConnectError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the Ledgerdeck service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response parsed but does not match the expected schema.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl ConnectError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 | 403 => ApiRetryClass::ReauthRequired,
                408 | 409 | 423 | 425 | 429 => ApiRetryClass::Retryable,
                500..=599 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Http(_) => ApiRetryClass::Retryable,
            Self::Json(_) | Self::InvalidResponse(_) => ApiRetryClass::Permanent,
            Self::Auth(_) => ApiRetryClass::ReauthRequired,
        }
    }
}

impl From<ConnectError> for RemoteError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Http(err) => RemoteError::Transport(err.to_string()),
            ConnectError::Api { status, message } => RemoteError::Rejected { status, message },
            ConnectError::Auth(message) => RemoteError::Rejected {
                status: 401,
                message,
            },
            ConnectError::Json(err) => RemoteError::InvalidResponse(err.to_string()),
            ConnectError::InvalidResponse(message) => RemoteError::InvalidResponse(message),
        }
    }
}

impl From<ConnectError> for Error {
    fn from(err: ConnectError) -> Self {
        Error::Remote(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        assert_eq!(
            ConnectError::api(401, "unauthorized").retry_class(),
            ApiRetryClass::ReauthRequired
        );
        assert_eq!(
            ConnectError::auth("Invalid access token format").retry_class(),
            ApiRetryClass::ReauthRequired
        );
    }

    #[test]
    fn throttling_and_server_errors_are_retryable() {
        for status in [408, 429, 500, 503] {
            assert_eq!(
                ConnectError::api(status, "try later").retry_class(),
                ApiRetryClass::Retryable,
                "status {}",
                status
            );
        }
        assert_eq!(
            ConnectError::api(404, "no such group").retry_class(),
            ApiRetryClass::Permanent
        );
    }

    #[test]
    fn api_error_keeps_status_through_core_conversion() {
        let err: Error = ConnectError::api(422, "VALIDATION: sortOrder out of range").into();
        assert!(matches!(
            err,
            Error::Remote(RemoteError::Rejected { status: 422, ref message })
                if message.contains("sortOrder")
        ));
    }
}
