//! Authentication service.
//!
//! Password sign-up and sign-in issuing signed bearer tokens, sign-out by
//! token revocation, and emailed password reset.

mod error;
pub mod token;

pub use error::AuthError;
pub use token::{Claims, TokenIssuer};

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::instrument;

use customer_manager_core::{
    DisplayName, Email, FieldError, Password, Role, SessionUser, UserId, UserProfile,
    ValidationErrors,
};

use crate::db::{RepositoryError, UserStore};
use crate::services::email::EmailService;

/// How long a password reset token stays valid.
pub const RESET_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// A freshly issued bearer token and the identity it carries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: SessionUser,
}

/// A password reset token as handed to the delivery channel.
#[derive(Debug, Clone)]
pub struct PasswordResetTicket {
    pub user: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Authentication service.
///
/// Cheap to clone; clones share the revocation list.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: TokenIssuer,
    revoked: Cache<String, ()>,
    mailer: Option<EmailService>,
    public_url: String,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenIssuer,
        mailer: Option<EmailService>,
        public_url: impl Into<String>,
    ) -> Self {
        // A revoked token only needs remembering until it would expire anyway.
        let revoked = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(tokens.ttl() + Duration::from_secs(60))
            .build();

        Self {
            users,
            tokens,
            revoked,
            mailer,
            public_url: public_url.into(),
        }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new user and sign them in.
    ///
    /// The profile is created with role `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` if any field is invalid and
    /// `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<IssuedToken, AuthError> {
        let mut errors = ValidationErrors::new();
        let email = errors.check("email", Email::parse(email).map_err(FieldError::from));
        let password = errors.check("password", Password::parse(password));
        let display_name = errors.check("displayName", DisplayName::parse(display_name));
        let (Some(email), Some(password), Some(display_name)) = (email, password, display_name)
        else {
            return Err(AuthError::Validation(errors));
        };

        let password_hash = hash_password(password).await?;

        let profile = UserProfile {
            uid: UserId::generate(),
            email,
            display_name: display_name.into_inner(),
            role: Role::User,
            email_verified: false,
            created_at: Utc::now(),
        };

        self.users
            .create_with_password(&profile, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %profile.uid, "User registered");
        self.issue(profile.session_user())
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (profile, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password.to_owned(), password_hash).await?;

        self.issue(profile.session_user())
    }

    /// Revoke a token until it expires.
    pub async fn logout(&self, claims: &Claims) {
        self.revoked.insert(claims.jti.clone(), ()).await;
        tracing::info!(user_id = %claims.sub, "User signed out");
    }

    /// Resolve a bearer token to its identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken`, `AuthError::TokenExpired` or
    /// `AuthError::TokenRevoked`.
    pub async fn authenticate(&self, token: &str) -> Result<(SessionUser, Claims), AuthError> {
        let claims = self.tokens.verify(token)?;
        if self.revoked.contains_key(&claims.jti) {
            return Err(AuthError::TokenRevoked);
        }
        let user = claims.session_user()?;
        Ok((user, claims))
    }

    /// Load the stored profile of an authenticated user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the account no longer exists.
    pub async fn profile(&self, user: UserId) -> Result<UserProfile, AuthError> {
        self.users
            .get_by_id(user)
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    fn issue(&self, user: SessionUser) -> Result<IssuedToken, AuthError> {
        let (token, claims) = self.tokens.issue(&user)?;
        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at(),
            user,
        })
    }

    // =========================================================================
    // Password Reset
    // =========================================================================

    /// Start a password reset.
    ///
    /// Unknown emails are not an error, so callers cannot probe for accounts.
    /// When SMTP is configured the link is mailed; delivery failures are
    /// logged and reported to Sentry but not returned.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the token cannot be stored.
    #[instrument(skip(self))]
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<PasswordResetTicket>, AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(None);
        };
        let Some(profile) = self.users.get_by_email(&email).await? else {
            tracing::info!("Password reset requested for unknown email");
            return Ok(None);
        };

        let token = generate_reset_token();
        let ttl = chrono::Duration::from_std(RESET_TOKEN_TTL).unwrap_or(chrono::Duration::hours(1));
        let expires_at = Utc::now() + ttl;

        self.users
            .create_reset_token(profile.uid, &hash_reset_token(&token), expires_at)
            .await?;

        match &self.mailer {
            Some(mailer) => {
                let url = format!(
                    "{}/reset-password?token={token}",
                    self.public_url.trim_end_matches('/')
                );
                if let Err(e) = mailer
                    .send_password_reset(profile.email.as_str(), &profile.display_name, &url)
                    .await
                {
                    let event_id = sentry::capture_error(&e);
                    tracing::error!(error = %e, sentry_event_id = %event_id, "Failed to send password reset email");
                }
            }
            None => {
                tracing::warn!(user_id = %profile.uid, "SMTP not configured; password reset link not sent");
            }
        }

        Ok(Some(PasswordResetTicket {
            user: profile.uid,
            token,
            expires_at,
        }))
    }

    /// Finish a password reset with the emailed token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for a too-short password and
    /// `AuthError::InvalidResetToken` if the token is unknown, used or expired.
    #[instrument(skip_all)]
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let mut errors = ValidationErrors::new();
        let Some(password) = errors.check("password", Password::parse(new_password)) else {
            return Err(AuthError::Validation(errors));
        };

        let user = self
            .users
            .consume_reset_token(&hash_reset_token(token.trim()), Utc::now())
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        let password_hash = hash_password(password).await?;
        self.users.set_password_hash(user, &password_hash).await?;

        tracing::info!(user_id = %user, "Password reset completed");
        Ok(())
    }
}

/// 32 random bytes, hex encoded.
fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Reset tokens are stored as SHA-256 digests, never in the clear.
fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Hash a password using Argon2id off the async runtime.
async fn hash_password(password: Password) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.expose().as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| AuthError::PasswordHash)
    })
    .await
    .map_err(|_| AuthError::PasswordHash)?
}

/// Verify a password against a hash off the async runtime.
async fn verify_password(password: String, hash: String) -> Result<(), AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&hash).map_err(|_| AuthError::InvalidCredentials)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)
    })
    .await
    .map_err(|_| AuthError::PasswordHash)?
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::config::TokenConfig;
    use crate::db::MemoryUserStore;

    fn service() -> AuthService {
        let tokens = TokenIssuer::new(&TokenConfig {
            secret: SecretString::from("Zq8#mV2!pL5@xR9$kT3&wN7*bH4^cJ6%"),
            ttl: Duration::from_secs(3600),
        });
        AuthService::new(Arc::new(MemoryUserStore::new()), tokens, None, "http://cm.test")
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service();
        let registered = auth
            .register("grace@example.com", "hopper1", "Grace Hopper")
            .await
            .unwrap();
        assert_eq!(registered.user.display_name, "Grace Hopper");
        assert!(!registered.user.email_verified);

        let profile = auth.profile(registered.user.uid).await.unwrap();
        assert_eq!(profile.role, Role::User);

        let logged_in = auth.login("grace@example.com", "hopper1").await.unwrap();
        assert_eq!(logged_in.user.uid, registered.user.uid);

        let (user, _) = auth.authenticate(&logged_in.token).await.unwrap();
        assert_eq!(user.email.as_str(), "grace@example.com");
    }

    #[tokio::test]
    async fn test_register_validates_every_field() {
        let auth = service();
        let Err(AuthError::Validation(errors)) = auth.register("nope", "123", "x").await else {
            panic!("expected validation error");
        };
        assert!(errors.contains("email"));
        assert!(errors.contains("password"));
        assert!(errors.contains("displayName"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let auth = service();
        auth.register("dup@example.com", "secret1", "Dup").await.unwrap();
        assert!(matches!(
            auth.register("dup@example.com", "secret2", "Dup").await,
            Err(AuthError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_the_same() {
        let auth = service();
        auth.register("a@example.com", "right-pass", "Alice").await.unwrap();
        assert!(matches!(
            auth.login("a@example.com", "wrong-pass").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("b@example.com", "right-pass").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_only_that_token() {
        let auth = service();
        let first = auth.register("c@example.com", "secret1", "Carol").await.unwrap();
        let second = auth.login("c@example.com", "secret1").await.unwrap();

        let (_, claims) = auth.authenticate(&first.token).await.unwrap();
        auth.logout(&claims).await;

        assert!(matches!(
            auth.authenticate(&first.token).await,
            Err(AuthError::TokenRevoked)
        ));
        assert!(auth.authenticate(&second.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_password_reset_round_trip() {
        let auth = service();
        auth.register("d@example.com", "old-pass", "Dan").await.unwrap();

        let ticket = auth
            .request_password_reset("d@example.com")
            .await
            .unwrap()
            .unwrap();
        auth.confirm_password_reset(&ticket.token, "new-pass")
            .await
            .unwrap();

        assert!(auth.login("d@example.com", "new-pass").await.is_ok());
        assert!(auth.login("d@example.com", "old-pass").await.is_err());
        assert!(matches!(
            auth.confirm_password_reset(&ticket.token, "again-pass").await,
            Err(AuthError::InvalidResetToken)
        ));
    }

    #[tokio::test]
    async fn test_password_reset_for_unknown_email_is_silent() {
        let auth = service();
        assert!(auth
            .request_password_reset("ghost@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_reset_tokens_are_random_and_hashed() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_ne!(hash_reset_token(&a), a);
        assert_eq!(hash_reset_token(&a), hash_reset_token(&a));
    }
}
