//! User repository over `PostgreSQL`.
//!
//! Accounts, password hashes and password reset tokens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use customer_manager_core::{Email, Role, UserId, UserProfile};

use super::{RepositoryError, UserStore};

/// A `users` row as stored.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    display_name: String,
    role: String,
    email_verified: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserProfile {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let role = row.role.parse::<Role>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid role in database: {e}"))
        })?;

        Ok(Self {
            uid: UserId::new(row.id),
            email,
            display_name: row.display_name,
            role,
            email_verified: row.email_verified,
            created_at: row.created_at,
        })
    }
}

/// A `users` row joined with its password hash.
#[derive(Debug, sqlx::FromRow)]
struct UserWithPasswordRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

/// Repository for user database operations.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserRepository {
    async fn create_with_password(
        &self,
        profile: &UserProfile,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO users (id, email, display_name, role, email_verified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(profile.uid)
        .bind(profile.email.as_str())
        .bind(&profile.display_name)
        .bind(profile.role.as_str())
        .bind(profile.email_verified)
        .bind(profile.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| super::conflict_on_unique(e, "email"))?;

        sqlx::query("INSERT INTO user_password (user_id, password_hash) VALUES ($1, $2)")
            .bind(profile.uid)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(
            r"
            SELECT id, email, display_name, role, email_verified, created_at
            FROM users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserProfile::try_from).transpose()
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<UserProfile>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(
            r"
            SELECT id, email, display_name, role, email_verified, created_at
            FROM users
            WHERE email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserProfile::try_from).transpose()
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(UserProfile, String)>, RepositoryError> {
        let row: Option<UserWithPasswordRow> = sqlx::query_as(
            r"
            SELECT u.id, u.email, u.display_name, u.role, u.email_verified, u.created_at,
                   p.password_hash
            FROM users u
            JOIN user_password p ON p.user_id = u.id
            WHERE u.email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Ok((UserProfile::try_from(r.user)?, r.password_hash)))
            .transpose()
    }

    async fn set_password_hash(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE user_password
            SET password_hash = $2, updated_at = NOW()
            WHERE user_id = $1
            ",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn create_reset_token(
        &self,
        user: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO password_reset_token (token_hash, user_id, expires_at)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(token_hash)
        .bind(user)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| super::conflict_on_unique(e, "reset token"))?;

        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, RepositoryError> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            r"
            UPDATE password_reset_token
            SET used_at = $2
            WHERE token_hash = $1 AND used_at IS NULL AND expires_at > $2
            RETURNING user_id
            ",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id.map(UserId::new))
    }
}
