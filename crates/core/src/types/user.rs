//! Identities as seen by the rest of the system.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::UserId;

/// The authenticated identity carried by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    /// Stable user id; owner key for customer records.
    pub uid: UserId,
    /// Sign-in email.
    pub email: Email,
    /// Name shown in the UI.
    pub display_name: String,
    /// Whether the email address has been confirmed.
    pub email_verified: bool,
}

/// Account role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account.
    #[default]
    User,
    /// Administrator.
    Admin,
}

impl Role {
    /// Lowercase name, as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored role name is unknown.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

/// The stored profile document created at sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User id.
    pub uid: UserId,
    /// Sign-in email.
    pub email: Email,
    /// Display name.
    pub display_name: String,
    /// Account role.
    pub role: Role,
    /// Whether the email address has been confirmed.
    pub email_verified: bool,
    /// Sign-up time.
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// The session view of this profile.
    #[must_use]
    pub fn session_user(&self) -> SessionUser {
        SessionUser {
            uid: self.uid,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            email_verified: self.email_verified,
        }
    }
}
