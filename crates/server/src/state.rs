//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::{ServerConfig, StoreBackend};
use crate::db::{
    self, CustomerStore, MemoryCustomerStore, MemoryUserStore, PgCustomerRepository,
    PgUserRepository, RepositoryError, UserStore,
};
use crate::geocoding::{GeocodingClient, GeocodingError};
use crate::services::{AuthService, CustomerService, EmailService, MailError, TokenIssuer};

/// Error assembling the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("geocoder error: {0}")]
    Geocoder(#[from] GeocodingError),
    #[error("email error: {0}")]
    Email(#[from] MailError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: Option<PgPool>,
    customer_store: Arc<dyn CustomerStore>,
    auth: AuthService,
    customers: CustomerService,
    geocoder: GeocodingClient,
}

impl AppState {
    /// Build state for the configured store backend.
    ///
    /// Migrations are not run here; apply them with `cm migrate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database, geocoder or mailer cannot be set up.
    pub async fn from_config(config: ServerConfig) -> Result<Self, StateError> {
        let pool = match &config.store {
            StoreBackend::Postgres { database_url } => Some(db::create_pool(database_url).await?),
            StoreBackend::Memory => None,
        };

        match pool {
            Some(pool) => {
                tracing::info!("Database pool created");
                let customers = Arc::new(PgCustomerRepository::new(pool.clone()));
                let users = Arc::new(PgUserRepository::new(pool.clone()));
                Self::with_stores(config, customers, users, Some(pool))
            }
            None => {
                tracing::warn!("Using in-memory store; data is lost on restart");
                Self::with_stores(
                    config,
                    Arc::new(MemoryCustomerStore::new()),
                    Arc::new(MemoryUserStore::new()),
                    None,
                )
            }
        }
    }

    /// Build state over explicit stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the geocoder or mailer cannot be set up.
    pub fn with_stores(
        config: ServerConfig,
        customer_store: Arc<dyn CustomerStore>,
        user_store: Arc<dyn UserStore>,
        pool: Option<PgPool>,
    ) -> Result<Self, StateError> {
        let geocoder = GeocodingClient::new(&config.geocoder)?;
        let mailer = config
            .email
            .as_ref()
            .map(EmailService::new)
            .transpose()?;
        let auth = AuthService::new(
            user_store,
            TokenIssuer::new(&config.token),
            mailer,
            config.public_url.clone(),
        );
        let customers = CustomerService::new(Arc::clone(&customer_store));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                customer_store,
                auth,
                customers,
                geocoder,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// The `PostgreSQL` pool, when that backend is in use.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// Get a reference to the authentication service.
    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    /// Get a reference to the customer service.
    #[must_use]
    pub fn customers(&self) -> &CustomerService {
        &self.inner.customers
    }

    /// Get a reference to the geocoding client.
    #[must_use]
    pub fn geocoder(&self) -> &GeocodingClient {
        &self.inner.geocoder
    }

    /// Check that the backing store answers.
    ///
    /// # Errors
    ///
    /// Returns the store's error if it is unreachable.
    pub async fn ping_store(&self) -> Result<(), RepositoryError> {
        self.inner.customer_store.ping().await
    }
}
