//! Customer records for the signed-in user.
//!
//! Every call first checks the session for an identity. Search is local:
//! it lists the user's records and filters them in memory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::instrument;

use customer_manager_core::{Customer, CustomerDraft, CustomerId, CustomerPatch, SessionUser};

use crate::autocomplete::GeoFields;
use crate::debounce::{Resolver, SearchPipeline, SearchState};
use crate::error::ClientError;
use crate::session::AuthSession;

/// Wait after the last keystroke before filtering the list.
pub const CUSTOMER_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Owner-scoped customer operations.
#[derive(Clone)]
pub struct CustomerClient {
    session: AuthSession,
}

impl CustomerClient {
    #[must_use]
    pub const fn new(session: AuthSession) -> Self {
        Self { session }
    }

    fn identity(&self) -> Result<SessionUser, ClientError> {
        self.session
            .current_user()
            .ok_or(ClientError::AuthenticationRequired)
    }

    /// A rejected token ends the session.
    fn observe<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e) = &result
            && e.is_unauthorized()
        {
            tracing::info!("Session rejected by server; signing out locally");
            self.session.expire();
        }
        result
    }

    /// Own records, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AuthenticationRequired` without a session.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Customer>, ClientError> {
        self.identity()?;
        self.observe(self.session.api().list_customers().await)
    }

    /// One record.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound`, or `ClientError::Forbidden` if the
    /// record belongs to someone else.
    #[instrument(skip(self))]
    pub async fn get(&self, id: CustomerId) -> Result<Customer, ClientError> {
        let user = self.identity()?;
        let customer = self.observe(self.session.api().get_customer(id).await)?;
        if customer.created_by != user.uid {
            return Err(ClientError::Forbidden);
        }
        Ok(customer)
    }

    /// Create a record, optionally with geocoded fields.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` listing every invalid field.
    #[instrument(skip(self, draft, geo))]
    pub async fn create(
        &self,
        mut draft: CustomerDraft,
        geo: Option<GeoFields>,
    ) -> Result<Customer, ClientError> {
        self.identity()?;
        if let Some(geo) = geo {
            draft.formatted_address = Some(geo.formatted_address);
            draft.latitude = Some(geo.latitude);
            draft.longitude = Some(geo.longitude);
        }
        self.observe(self.session.api().create_customer(&draft).await)
    }

    /// Change the provided fields.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation`, `ClientError::NotFound` or
    /// `ClientError::Forbidden`.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: CustomerId,
        patch: &CustomerPatch,
    ) -> Result<Customer, ClientError> {
        self.identity()?;
        self.observe(self.session.api().update_customer(id, patch).await)
    }

    /// Delete a record.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` (also for an id that never existed)
    /// or `ClientError::Forbidden`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: CustomerId) -> Result<(), ClientError> {
        self.identity()?;
        self.observe(self.session.api().delete_customer(id).await)
    }

    /// Records whose names, email, address or id number contain `term`,
    /// ignoring case. A blank term returns everything.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AuthenticationRequired` without a session.
    #[instrument(skip(self))]
    pub async fn search(&self, term: &str) -> Result<Vec<Customer>, ClientError> {
        let mut customers = self.list().await?;
        customers.retain(|c| c.matches(term));
        Ok(customers)
    }
}

#[async_trait]
impl Resolver<Vec<Customer>> for CustomerClient {
    async fn resolve(&self, query: &str) -> Result<Vec<Customer>, ClientError> {
        self.search(query).await
    }
}

/// Debounced search-as-you-type over the customer list.
#[derive(Clone)]
pub struct CustomerSearch {
    pipeline: SearchPipeline<Vec<Customer>>,
}

impl CustomerSearch {
    #[must_use]
    pub fn new(customers: CustomerClient) -> Self {
        Self::with_delay(customers, CUSTOMER_SEARCH_DEBOUNCE)
    }

    #[must_use]
    pub fn with_delay(customers: CustomerClient, delay: Duration) -> Self {
        Self {
            pipeline: SearchPipeline::new(delay, Arc::new(customers)),
        }
    }

    /// The search box changed.
    pub fn input(&self, term: impl Into<String>) {
        self.pipeline.input(term);
    }

    pub fn clear(&self) {
        self.pipeline.clear();
    }

    /// Wait for the latest term to finish resolving.
    pub async fn settled(&self) -> SearchState<Vec<Customer>> {
        self.pipeline.settled().await
    }

    #[must_use]
    pub fn state(&self) -> SearchState<Vec<Customer>> {
        self.pipeline.state()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SearchState<Vec<Customer>>> {
        self.pipeline.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;
    use crate::api::ApiClient;
    use crate::config::ClientConfig;

    fn client() -> CustomerClient {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:9").unwrap());
        CustomerClient::new(AuthSession::new(ApiClient::new(&config).unwrap()))
    }

    #[tokio::test]
    async fn test_every_operation_requires_identity() {
        let client = client();
        let id = CustomerId::generate();

        assert!(matches!(client.list().await, Err(ClientError::AuthenticationRequired)));
        assert!(matches!(client.get(id).await, Err(ClientError::AuthenticationRequired)));
        assert!(matches!(
            client.create(CustomerDraft::default(), None).await,
            Err(ClientError::AuthenticationRequired)
        ));
        assert!(matches!(
            client.update(id, &CustomerPatch::default()).await,
            Err(ClientError::AuthenticationRequired)
        ));
        assert!(matches!(client.delete(id).await, Err(ClientError::AuthenticationRequired)));
        assert!(matches!(client.search("x").await, Err(ClientError::AuthenticationRequired)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_without_session_settles_idle() {
        let search = CustomerSearch::new(client());
        search.input("abc");
        assert!(search.state().is_pending());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(search.state(), SearchState::Idle);
    }
}
