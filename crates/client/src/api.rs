//! Typed client for the REST API.
//!
//! One method per endpoint. Non-success responses are mapped to
//! [`ClientError`] from the JSON error body; nothing is retried.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use customer_manager_core::{
    AddressSuggestion, Customer, CustomerDraft, CustomerId, CustomerPatch, SessionUser,
    UserProfile,
};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Queries shorter than this never leave the client.
pub const MIN_QUERY_LENGTH: usize = 3;

/// A signed-in session as returned by register and login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: SessionUser,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    user: UserProfile,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    display_name: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct ResetRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct ResetConfirm<'a> {
    token: &'a str,
    password: &'a str,
}

/// HTTP client for the Customer Manager API.
///
/// Cheap to clone; clones share the connection pool and the bearer token.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("customer-manager-client/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        let mut base = config.api_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let base = base.join("api/v1/")?;

        Ok(Self {
            http,
            base,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// The bearer token currently attached to requests.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attach (or detach) a bearer token.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let url = self.base.join(path)?;
        let builder = self.http.request(method, url);
        Ok(match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = ClientError::from_response(status, &body);
        tracing::debug!(status = %status, error = %err, "API request failed");
        Err(err)
    }

    async fn json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
        let response = Self::check(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn empty(builder: RequestBuilder) -> Result<(), ClientError> {
        Self::check(builder.send().await?).await?;
        Ok(())
    }

    // =========================================================================
    // Geocoding
    // =========================================================================

    /// Best match for a full address, or `None` if it cannot be found.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::UpstreamUnavailable` if the provider is down.
    #[instrument(skip(self))]
    pub async fn geocode(&self, address: &str) -> Result<Option<AddressSuggestion>, ClientError> {
        if address.trim().chars().count() < MIN_QUERY_LENGTH {
            return Ok(None);
        }
        let builder = self.request(Method::GET, "geocode")?.query(&[("q", address)]);
        match Self::json(builder).await {
            Ok(suggestion) => Ok(Some(suggestion)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Up to five candidates for a partial address.
    ///
    /// Short queries return an empty list without a request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn autocomplete(&self, partial: &str) -> Result<Vec<AddressSuggestion>, ClientError> {
        if partial.trim().chars().count() < MIN_QUERY_LENGTH {
            return Ok(Vec::new());
        }
        let builder = self
            .request(Method::GET, "autocomplete")?
            .query(&[("q", partial)]);
        Self::json(builder).await
    }

    // =========================================================================
    // Auth
    // =========================================================================

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` or `ClientError::Conflict`.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthResponse, ClientError> {
        let builder = self
            .request(Method::POST, "auth/register")?
            .json(&RegisterRequest {
                email,
                password,
                display_name,
            });
        Self::json(builder).await
    }

    /// Sign in.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` for wrong credentials.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let builder = self
            .request(Method::POST, "auth/login")?
            .json(&LoginRequest { email, password });
        Self::json(builder).await
    }

    /// Revoke the attached token.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ClientError> {
        Self::empty(self.request(Method::POST, "auth/logout")?).await
    }

    /// Ask for a password reset email.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ClientError> {
        let builder = self
            .request(Method::POST, "auth/password-reset")?
            .json(&ResetRequest { email });
        Self::empty(builder).await
    }

    /// Set a new password with a reset token.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::BadRequest` for an invalid or expired token.
    #[instrument(skip_all)]
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        password: &str,
    ) -> Result<(), ClientError> {
        let builder = self
            .request(Method::POST, "auth/password-reset/confirm")?
            .json(&ResetConfirm { token, password });
        Self::empty(builder).await
    }

    /// The signed-in user's profile.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` if the token is not valid.
    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<UserProfile, ClientError> {
        let response: ProfileResponse =
            Self::json(self.request(Method::GET, "protected/profile")?).await?;
        Ok(response.user)
    }

    // =========================================================================
    // Customers
    // =========================================================================

    /// Own customers, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_customers(&self) -> Result<Vec<Customer>, ClientError> {
        Self::json(self.request(Method::GET, "protected/customers")?).await
    }

    /// One customer.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` or `ClientError::Forbidden`.
    #[instrument(skip(self))]
    pub async fn get_customer(&self, id: CustomerId) -> Result<Customer, ClientError> {
        Self::json(self.request(Method::GET, &format!("protected/customers/{id}"))?).await
    }

    /// Create a customer.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` listing every invalid field.
    #[instrument(skip(self, draft))]
    pub async fn create_customer(&self, draft: &CustomerDraft) -> Result<Customer, ClientError> {
        let builder = self.request(Method::POST, "protected/customers")?.json(draft);
        Self::json(builder).await
    }

    /// Change the provided fields of a customer.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation`, `ClientError::NotFound` or
    /// `ClientError::Forbidden`.
    #[instrument(skip(self, patch))]
    pub async fn update_customer(
        &self,
        id: CustomerId,
        patch: &CustomerPatch,
    ) -> Result<Customer, ClientError> {
        let builder = self
            .request(Method::PATCH, &format!("protected/customers/{id}"))?
            .json(patch);
        Self::json(builder).await
    }

    /// Delete a customer.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` or `ClientError::Forbidden`.
    #[instrument(skip(self))]
    pub async fn delete_customer(&self, id: CustomerId) -> Result<(), ClientError> {
        Self::empty(self.request(Method::DELETE, &format!("protected/customers/{id}"))?).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(&ClientConfig::new(Url::parse(base).unwrap())).unwrap()
    }

    #[test]
    fn test_base_url_gets_api_prefix() {
        assert_eq!(client("http://h:3000").base.as_str(), "http://h:3000/api/v1/");
        assert_eq!(
            client("http://h/prefix").base.join("geocode").unwrap().as_str(),
            "http://h/prefix/api/v1/geocode"
        );
    }

    #[test]
    fn test_token_is_shared_between_clones() {
        let a = client("http://h:3000");
        let b = a.clone();
        a.set_token(Some("t".to_string()));
        assert_eq!(b.token().as_deref(), Some("t"));
        b.set_token(None);
        assert!(a.token().is_none());
    }

    #[tokio::test]
    async fn test_short_queries_skip_the_network() {
        // Nothing listens on the discard port
        let api = client("http://127.0.0.1:9");
        assert!(api.autocomplete("ab").await.unwrap().is_empty());
        assert!(api.geocode(" a ").await.unwrap().is_none());
    }
}
