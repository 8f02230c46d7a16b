//! Client error types.
//!
//! Every failure the UI can see maps to one variant, and every variant has a
//! short message fit to show a user.

use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors returned by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The operation needs a signed-in user and there is none.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The server rejected the credentials or token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The record belongs to someone else.
    #[error("forbidden")]
    Forbidden,

    /// The record or address does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Field validation failed.
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: BTreeMap<String, String>,
    },

    /// Duplicate (e.g. email already registered).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Too many requests.
    #[error("rate limited")]
    RateLimited,

    /// The geocoding provider is unavailable.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The request was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The server failed.
    #[error("server error ({status}): {message}")]
    Server { status: StatusCode, message: String },

    /// The request could not be sent or the response could not be read.
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// A URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Error body returned by the API.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    details: Option<BTreeMap<String, String>>,
}

impl ClientError {
    /// Map a non-success response to an error.
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        let body: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = if body.error.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Unexpected response")
                .to_string()
        } else {
            body.error
        };

        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(message),
            StatusCode::FORBIDDEN => Self::Forbidden,
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::UNPROCESSABLE_ENTITY => Self::Validation {
                message,
                details: body.details.unwrap_or_default(),
            },
            StatusCode::CONFLICT => Self::Conflict(message),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
                Self::UpstreamUnavailable(message)
            }
            s if s.is_client_error() => Self::BadRequest(message),
            s => Self::Server { status: s, message },
        }
    }

    /// Whether the session should be dropped.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// A short message fit to show a user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthenticationRequired => "Please sign in first".to_string(),
            Self::Unauthorized(message) => match message.as_str() {
                "Invalid email or password" => message.clone(),
                "Token expired" | "Token revoked" | "Invalid token" => {
                    "Your session has ended, please sign in again".to_string()
                }
                _ => "Please sign in first".to_string(),
            },
            Self::Forbidden => "You do not have access to this customer".to_string(),
            Self::NotFound(message) => message.clone(),
            Self::Validation { details, message } => {
                if details.is_empty() {
                    message.clone()
                } else {
                    details.values().cloned().collect::<Vec<_>>().join("; ")
                }
            }
            Self::Conflict(_) => "Email is already registered".to_string(),
            Self::RateLimited => "Too many attempts, please wait and try again".to_string(),
            Self::UpstreamUnavailable(_) => "Address lookup is unavailable right now".to_string(),
            Self::BadRequest(message) => message.clone(),
            Self::Server { .. } => "Something went wrong, please try again".to_string(),
            Self::Http(_) => "Network error, check your connection".to_string(),
            Self::InvalidUrl(_) => "Invalid server address".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ClientError::from_response(StatusCode::FORBIDDEN, r#"{"error":"Forbidden"}"#),
            ClientError::Forbidden
        ));
        assert!(matches!(
            ClientError::from_response(StatusCode::BAD_GATEWAY, ""),
            ClientError::UpstreamUnavailable(_)
        ));
        assert!(matches!(
            ClientError::from_response(StatusCode::BAD_REQUEST, "not json"),
            ClientError::BadRequest(m) if m == "Bad Request"
        ));
        assert!(matches!(
            ClientError::from_response(StatusCode::INTERNAL_SERVER_ERROR, "{}"),
            ClientError::Server { .. }
        ));
    }

    #[test]
    fn test_validation_details_are_kept() {
        let err = ClientError::from_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error":"Validation failed","details":{"email":"email is required"}}"#,
        );
        let ClientError::Validation { details, .. } = &err else {
            panic!("expected validation error");
        };
        assert_eq!(details["email"], "email is required");
        assert_eq!(err.user_message(), "email is required");
    }

    #[test]
    fn test_user_messages() {
        let bad_login =
            ClientError::from_response(StatusCode::UNAUTHORIZED, r#"{"error":"Invalid email or password"}"#);
        assert_eq!(bad_login.user_message(), "Invalid email or password");
        assert!(bad_login.is_unauthorized());

        let duplicate =
            ClientError::from_response(StatusCode::CONFLICT, r#"{"error":"Email is already registered"}"#);
        assert_eq!(duplicate.user_message(), "Email is already registered");
    }
}
