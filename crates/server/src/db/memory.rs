//! In-memory stores for development mode and tests.
//!
//! Same contracts as the `PostgreSQL` repositories; data lives for the
//! lifetime of the process.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use customer_manager_core::{Customer, CustomerId, Email, UserId, UserProfile};

use super::{CustomerStore, RepositoryError, UserStore};

/// Customer records in a map.
#[derive(Default)]
pub struct MemoryCustomerStore {
    customers: RwLock<HashMap<CustomerId, Customer>>,
}

impl MemoryCustomerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerStore for MemoryCustomerStore {
    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        let mut owned: Vec<Customer> = customers
            .values()
            .filter(|c| c.created_by == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(owned)
    }

    async fn get(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.customers.read().await.get(&id).cloned())
    }

    async fn insert(&self, customer: &Customer) -> Result<(), RepositoryError> {
        let mut customers = self.customers.write().await;
        if customers.contains_key(&customer.id) {
            return Err(RepositoryError::Conflict("customer already exists".to_owned()));
        }
        customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn update(&self, customer: &Customer) -> Result<(), RepositoryError> {
        let mut customers = self.customers.write().await;
        let stored = customers
            .get_mut(&customer.id)
            .ok_or(RepositoryError::NotFound)?;

        let (created_by, created_at) = (stored.created_by, stored.created_at);
        *stored = customer.clone();
        stored.created_by = created_by;
        stored.created_at = created_at;
        Ok(())
    }

    async fn delete(&self, id: CustomerId) -> Result<bool, RepositoryError> {
        Ok(self.customers.write().await.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

struct StoredUser {
    profile: UserProfile,
    password_hash: String,
}

struct ResetToken {
    user: UserId,
    expires_at: DateTime<Utc>,
    used: bool,
}

#[derive(Default)]
struct Users {
    by_id: HashMap<UserId, StoredUser>,
    by_email: HashMap<String, UserId>,
    reset_tokens: HashMap<String, ResetToken>,
}

/// Accounts, password hashes and reset tokens in maps.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Users>,
}

impl MemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_with_password(
        &self,
        profile: &UserProfile,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        if users.by_email.contains_key(profile.email.as_str()) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        users
            .by_email
            .insert(profile.email.as_str().to_owned(), profile.uid);
        users.by_id.insert(
            profile.uid,
            StoredUser {
                profile: profile.clone(),
                password_hash: password_hash.to_owned(),
            },
        );
        Ok(())
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .by_id
            .get(&id)
            .map(|u| u.profile.clone()))
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<UserProfile>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users
            .by_email
            .get(email.as_str())
            .and_then(|id| users.by_id.get(id))
            .map(|u| u.profile.clone()))
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(UserProfile, String)>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users
            .by_email
            .get(email.as_str())
            .and_then(|id| users.by_id.get(id))
            .map(|u| (u.profile.clone(), u.password_hash.clone())))
    }

    async fn set_password_hash(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let user = users.by_id.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        password_hash.clone_into(&mut user.password_hash);
        Ok(())
    }

    async fn create_reset_token(
        &self,
        user: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        if users.reset_tokens.contains_key(token_hash) {
            return Err(RepositoryError::Conflict("reset token already exists".to_owned()));
        }
        users.reset_tokens.insert(
            token_hash.to_owned(),
            ResetToken {
                user,
                expires_at,
                used: false,
            },
        );
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, RepositoryError> {
        let mut users = self.users.write().await;
        match users.reset_tokens.get_mut(token_hash) {
            Some(token) if !token.used && token.expires_at > now => {
                token.used = true;
                Ok(Some(token.user))
            }
            _ => Ok(None),
        }
    }
}
