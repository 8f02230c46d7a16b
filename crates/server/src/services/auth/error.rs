//! Authentication error types.

use thiserror::Error;

use customer_manager_core::ValidationErrors;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Sign-up or reset input failed validation.
    #[error("invalid input: {0}")]
    Validation(ValidationErrors),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// No bearer token was presented.
    #[error("missing bearer token")]
    MissingToken,

    /// Token signature, shape or claims are invalid.
    #[error("invalid token")]
    InvalidToken,

    /// Token has expired.
    #[error("token expired")]
    TokenExpired,

    /// Token was revoked by sign-out.
    #[error("token revoked")]
    TokenRevoked,

    /// Password reset token is unknown, used or expired.
    #[error("invalid or expired reset token")]
    InvalidResetToken,

    /// Token signing failed.
    #[error("token signing error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

impl AuthError {
    /// Whether the error means "present a valid token" (HTTP 401).
    #[must_use]
    pub const fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::MissingToken
                | Self::InvalidToken
                | Self::TokenExpired
                | Self::TokenRevoked
        )
    }
}
