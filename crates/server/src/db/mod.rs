//! Persistence for customers and identities.
//!
//! # Tables
//!
//! - `users` - Accounts and their profile (display name, role)
//! - `user_password` - Argon2id password hashes
//! - `password_reset_token` - Single-use reset tokens (SHA-256 hashed)
//! - `customers` - Customer records, owned by `created_by`
//!
//! Handlers and services only see the [`CustomerStore`] and [`UserStore`]
//! traits. [`customers::PgCustomerRepository`] and [`users::PgUserRepository`]
//! implement them over `PostgreSQL`; [`memory`] implements them over
//! in-process maps for development and tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p customer-manager-cli -- migrate
//! ```

pub mod customers;
pub mod memory;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use customer_manager_core::{Customer, CustomerId, Email, UserId, UserProfile};

pub use customers::PgCustomerRepository;
pub use memory::{MemoryCustomerStore, MemoryUserStore};
pub use users::PgUserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Storage for customer records.
///
/// Implementations do not check ownership; that is the caller's job.
#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// All records created by `owner`, newest first.
    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Customer>, RepositoryError>;

    /// A single record by id, regardless of owner.
    async fn get(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError>;

    /// Store a new record.
    async fn insert(&self, customer: &Customer) -> Result<(), RepositoryError>;

    /// Overwrite the mutable fields of an existing record.
    ///
    /// Returns `RepositoryError::NotFound` if the record no longer exists.
    async fn update(&self, customer: &Customer) -> Result<(), RepositoryError>;

    /// Delete a record. Returns `false` if it did not exist.
    async fn delete(&self, id: CustomerId) -> Result<bool, RepositoryError>;

    /// Check that the backing store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Storage for accounts, password hashes and reset tokens.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user and its password hash together.
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    async fn create_with_password(
        &self,
        profile: &UserProfile,
        password_hash: &str,
    ) -> Result<(), RepositoryError>;

    /// Look up a user by id.
    async fn get_by_id(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError>;

    /// Look up a user by email.
    async fn get_by_email(&self, email: &Email) -> Result<Option<UserProfile>, RepositoryError>;

    /// Look up a user and their password hash by email.
    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(UserProfile, String)>, RepositoryError>;

    /// Replace a user's password hash.
    async fn set_password_hash(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError>;

    /// Store a password reset token hash for `user`.
    async fn create_reset_token(
        &self,
        user: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Mark a reset token used and return its user, if it exists, is unused
    /// and has not expired at `now`.
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique-violation into `RepositoryError::Conflict`.
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}
