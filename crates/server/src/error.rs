//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Responses are JSON
//! `{"error": "...", "details": {...}}`; server-side failures are captured to
//! Sentry and answered with a generic message.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::geocoding::GeocodingError;
use crate::services::{AuthError, CustomerError};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Geocoding provider failed.
    #[error("Geocoding error: {0}")]
    Geocoding(#[from] GeocodingError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Customer operation failed.
    #[error("Customer error: {0}")]
    Customer(#[from] CustomerError),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Geocoding(_) => StatusCode::BAD_GATEWAY,
            Self::Auth(err) => match err {
                AuthError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                AuthError::InvalidCredentials
                | AuthError::MissingToken
                | AuthError::InvalidToken
                | AuthError::TokenExpired
                | AuthError::TokenRevoked => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::InvalidResetToken => StatusCode::BAD_REQUEST,
                AuthError::Token(_) | AuthError::Repository(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Customer(err) => match err {
                CustomerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CustomerError::Forbidden => StatusCode::FORBIDDEN,
                CustomerError::NotFound => StatusCode::NOT_FOUND,
                CustomerError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn body(&self) -> ErrorBody {
        let details = match self {
            Self::Auth(AuthError::Validation(errors))
            | Self::Customer(CustomerError::Validation(errors)) => Some(errors.fields().clone()),
            _ => None,
        };

        // Don't expose internal error details to clients
        let error = match self {
            Self::Geocoding(_) => "Geocoding service unavailable".to_string(),
            Self::Auth(err) => match err {
                AuthError::Validation(_) => "Validation failed".to_string(),
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::UserAlreadyExists => "Email is already registered".to_string(),
                AuthError::MissingToken => "Authentication required".to_string(),
                AuthError::InvalidToken => "Invalid token".to_string(),
                AuthError::TokenExpired => "Token expired".to_string(),
                AuthError::TokenRevoked => "Token revoked".to_string(),
                AuthError::InvalidResetToken => {
                    "Reset link is invalid or has expired".to_string()
                }
                _ => "Internal server error".to_string(),
            },
            Self::Customer(err) => match err {
                CustomerError::Validation(_) => "Validation failed".to_string(),
                CustomerError::Forbidden => "Forbidden".to_string(),
                CustomerError::NotFound => "Customer not found".to_string(),
                CustomerError::Repository(_) => "Internal server error".to_string(),
            },
            Self::RateLimited => "Too many requests".to_string(),
            Self::NotFound(msg) | Self::BadRequest(msg) => msg.clone(),
            Self::Database(_) => "Internal server error".to_string(),
        };

        ErrorBody { error, details }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        (status, Json(self.body())).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use customer_manager_core::{FieldError, ValidationErrors};

    use super::*;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::NotFound("x".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::BadRequest("x".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Customer(CustomerError::Forbidden).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Auth(AuthError::UserAlreadyExists).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Auth(AuthError::TokenRevoked).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Geocoding(GeocodingError::Malformed("x".to_string())).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_validation_error_carries_details() {
        let mut errors = ValidationErrors::new();
        errors.add("email", &FieldError::Required);
        let (status, body) = render(AppError::Customer(CustomerError::Validation(errors))).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["details"]["email"], "email is required");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) = render(AppError::Database(RepositoryError::DataCorruption(
            "bad row 42".to_string(),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_forbidden_is_generic() {
        let (_, body) = render(AppError::Customer(CustomerError::Forbidden)).await;
        assert_eq!(body, serde_json::json!({ "error": "Forbidden" }));
    }
}
