//! Signed bearer tokens (HS256 JWT).

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use customer_manager_core::{Email, SessionUser, UserId};

use super::AuthError;
use crate::config::TokenConfig;

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    /// Display name.
    pub name: String,
    pub email_verified: bool,
    /// Unique token id, used for revocation.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// The identity these claims describe.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if `sub` or `email` are malformed.
    pub fn session_user(&self) -> Result<SessionUser, AuthError> {
        Ok(SessionUser {
            uid: self.sub.parse::<UserId>().map_err(|_| AuthError::InvalidToken)?,
            email: Email::parse(&self.email).map_err(|_| AuthError::InvalidToken)?,
            display_name: self.name.clone(),
            email_verified: self.email_verified,
        })
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

/// Issues and verifies tokens with one shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer from configuration.
    #[must_use]
    pub fn new(config: &TokenConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: config.ttl,
        }
    }

    /// Token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a fresh token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Token` if signing fails.
    pub fn issue(&self, user: &SessionUser) -> Result<(String, Claims), AuthError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).map_err(|_| AuthError::InvalidToken)?;

        let claims = Claims {
            sub: user.uid.to_string(),
            email: user.email.to_string(),
            name: user.display_name.clone(),
            email_verified: user.email_verified,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok((token, claims))
    }

    /// Check signature and expiry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenExpired` for an expired token and
    /// `AuthError::InvalidToken` for anything else that fails validation.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn issuer(secret: &str, ttl: Duration) -> TokenIssuer {
        TokenIssuer::new(&TokenConfig {
            secret: SecretString::from(secret),
            ttl,
        })
    }

    fn user() -> SessionUser {
        SessionUser {
            uid: UserId::generate(),
            email: Email::parse("ada@example.com").unwrap(),
            display_name: "Ada".to_owned(),
            email_verified: false,
        }
    }

    #[test]
    fn test_issue_then_verify_returns_identity() {
        let issuer = issuer("0123456789abcdefghijklmnopqrstuv", Duration::from_secs(3600));
        let user = user();
        let (token, claims) = issuer.issue(&user).unwrap();

        let verified = issuer.verify(&token).unwrap();
        assert_eq!(verified, claims);
        assert_eq!(verified.session_user().unwrap(), user);
        assert_eq!(verified.exp - verified.iat, 3600);
    }

    #[test]
    fn test_each_token_has_a_unique_jti() {
        let issuer = issuer("0123456789abcdefghijklmnopqrstuv", Duration::from_secs(60));
        let user = user();
        let (_, a) = issuer.issue(&user).unwrap();
        let (_, b) = issuer.issue(&user).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let (token, _) = issuer("0123456789abcdefghijklmnopqrstuv", Duration::from_secs(60))
            .issue(&user())
            .unwrap();
        let other = issuer("vutsrqponmlkjihgfedcba9876543210", Duration::from_secs(60));
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let issuer = issuer("0123456789abcdefghijklmnopqrstuv", Duration::from_secs(60));
        let mut claims = issuer.issue(&user()).unwrap().1;
        claims.iat -= 3600;
        claims.exp -= 3600;
        let token = encode(&Header::new(Algorithm::HS256), &claims, &issuer.encoding).unwrap();
        assert!(matches!(issuer.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let issuer = issuer("0123456789abcdefghijklmnopqrstuv", Duration::from_secs(60));
        assert!(matches!(issuer.verify("not.a.jwt"), Err(AuthError::InvalidToken)));
    }
}
