//! Owner-scoped customer operations.
//!
//! Every operation takes the signed-in [`SessionUser`]; records belonging to
//! someone else are reported as forbidden without revealing their contents.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

use customer_manager_core::{
    Customer, CustomerDraft, CustomerId, CustomerPatch, SessionUser, ValidationErrors,
};

use crate::db::{CustomerStore, RepositoryError};

/// Errors from customer operations.
#[derive(Debug, Error)]
pub enum CustomerError {
    /// Field validation failed.
    #[error("invalid customer: {0}")]
    Validation(ValidationErrors),

    /// The record exists but belongs to another user.
    #[error("not allowed to access this customer")]
    Forbidden,

    /// No record with this id.
    #[error("customer not found")]
    NotFound,

    /// Storage failure.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Customer operations over a [`CustomerStore`].
#[derive(Clone)]
pub struct CustomerService {
    store: Arc<dyn CustomerStore>,
}

impl CustomerService {
    /// Create a new service.
    #[must_use]
    pub fn new(store: Arc<dyn CustomerStore>) -> Self {
        Self { store }
    }

    /// The user's customers, newest first, optionally filtered by a
    /// case-insensitive search term.
    ///
    /// # Errors
    ///
    /// Returns `CustomerError::Repository` on storage failure.
    #[instrument(skip(self, user), fields(user_id = %user.uid))]
    pub async fn list(
        &self,
        user: &SessionUser,
        term: Option<&str>,
    ) -> Result<Vec<Customer>, CustomerError> {
        let mut customers = self.store.list_by_owner(user.uid).await?;
        if let Some(term) = term {
            customers.retain(|c| c.matches(term));
        }
        Ok(customers)
    }

    /// One customer owned by the user.
    ///
    /// # Errors
    ///
    /// Returns `CustomerError::NotFound` or `CustomerError::Forbidden`.
    #[instrument(skip(self, user), fields(user_id = %user.uid))]
    pub async fn get(&self, user: &SessionUser, id: CustomerId) -> Result<Customer, CustomerError> {
        self.owned(user, id).await
    }

    /// Create a customer owned by the user.
    ///
    /// The server assigns the id, owner and timestamps.
    ///
    /// # Errors
    ///
    /// Returns `CustomerError::Validation` listing every invalid field.
    #[instrument(skip(self, user, draft), fields(user_id = %user.uid))]
    pub async fn create(
        &self,
        user: &SessionUser,
        draft: &CustomerDraft,
    ) -> Result<Customer, CustomerError> {
        let customer = draft
            .validate()
            .map_err(CustomerError::Validation)?
            .into_customer(CustomerId::generate(), user.uid, Utc::now());

        self.store.insert(&customer).await?;
        tracing::info!(customer_id = %customer.id, "Customer created");
        Ok(customer)
    }

    /// Apply the provided fields to a customer owned by the user.
    ///
    /// # Errors
    ///
    /// Returns `CustomerError::Validation`, `CustomerError::NotFound` or
    /// `CustomerError::Forbidden`.
    #[instrument(skip(self, user, patch), fields(user_id = %user.uid))]
    pub async fn update(
        &self,
        user: &SessionUser,
        id: CustomerId,
        patch: &CustomerPatch,
    ) -> Result<Customer, CustomerError> {
        let changes = patch.validate().map_err(CustomerError::Validation)?;
        let mut customer = self.owned(user, id).await?;

        customer.apply(changes, Utc::now());
        self.store.update(&customer).await.map_err(|e| match e {
            RepositoryError::NotFound => CustomerError::NotFound,
            other => CustomerError::Repository(other),
        })?;

        tracing::info!(customer_id = %id, "Customer updated");
        Ok(customer)
    }

    /// Delete a customer owned by the user.
    ///
    /// # Errors
    ///
    /// Returns `CustomerError::NotFound` or `CustomerError::Forbidden`.
    #[instrument(skip(self, user), fields(user_id = %user.uid))]
    pub async fn delete(&self, user: &SessionUser, id: CustomerId) -> Result<(), CustomerError> {
        self.owned(user, id).await?;
        if !self.store.delete(id).await? {
            return Err(CustomerError::NotFound);
        }
        tracing::info!(customer_id = %id, "Customer deleted");
        Ok(())
    }

    async fn owned(&self, user: &SessionUser, id: CustomerId) -> Result<Customer, CustomerError> {
        let customer = self.store.get(id).await?.ok_or(CustomerError::NotFound)?;
        if customer.created_by != user.uid {
            tracing::warn!(customer_id = %id, "Cross-owner customer access denied");
            return Err(CustomerError::Forbidden);
        }
        Ok(customer)
    }
}
