//! Geocoding client for the Nominatim address-lookup API.
//!
//! # Architecture
//!
//! - One `GET {base}/search?q=…&format=json&limit=N&accept-language=en`
//!   per lookup, with an identifying `User-Agent`
//! - Successful responses are cached in memory via `moka` (10 minute TTL),
//!   keyed by the normalized query and limit; failures are never cached
//! - No retries: a failed lookup is reported once and the caller decides
//!
//! [`GeocodingClient::search`] never fails; any provider problem yields an
//! empty list. [`GeocodingClient::geocode`] reports provider problems as
//! [`GeocodingError`] so the API can answer 502.

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use customer_manager_core::AddressSuggestion;

use crate::config::GeocoderConfig;
use types::NominatimPlace;

/// Queries shorter than this (in characters, after trimming) are answered
/// locally with no result.
pub const MIN_QUERY_LENGTH: usize = 3;

/// Number of candidates requested for autocomplete.
pub const SEARCH_LIMIT: u8 = 5;

const CACHE_TTL: Duration = Duration::from_secs(600);

/// Errors that can occur when calling the geocoding provider.
#[derive(Debug, Error)]
pub enum GeocodingError {
    /// The request could not be sent or timed out.
    #[error("geocoding provider unreachable: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("geocoding provider returned HTTP {0}")]
    Status(reqwest::StatusCode),

    /// The provider's body was not the expected JSON shape.
    #[error("malformed geocoding response: {0}")]
    Malformed(String),
}

/// Client for the Nominatim `/search` endpoint.
///
/// Cheap to clone; clones share the HTTP connection pool and the cache.
#[derive(Clone)]
pub struct GeocodingClient {
    inner: Arc<GeocodingClientInner>,
}

struct GeocodingClientInner {
    client: reqwest::Client,
    search_url: Url,
    cache: Cache<(String, u8), Arc<Vec<NominatimPlace>>>,
}

impl GeocodingClient {
    /// Create a new geocoding client.
    ///
    /// # Errors
    ///
    /// Returns `GeocodingError::Http` if the HTTP client cannot be built, or
    /// `GeocodingError::Malformed` if the base URL cannot take a path.
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodingError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;

        let mut base = config.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let search_url = base
            .join("search")
            .map_err(|e| GeocodingError::Malformed(format!("invalid provider URL: {e}")))?;

        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(CACHE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(GeocodingClientInner {
                client,
                search_url,
                cache,
            }),
        })
    }

    /// Address candidates for a partial query, most relevant first.
    ///
    /// Returns at most [`SEARCH_LIMIT`] entries. Short queries, provider
    /// failures and entries with unusable coordinates all yield fewer (or no)
    /// results rather than an error.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Vec<AddressSuggestion> {
        if !is_searchable(query) {
            return Vec::new();
        }

        match self.lookup(query, SEARCH_LIMIT).await {
            Ok(places) => places
                .iter()
                .filter_map(NominatimPlace::to_suggestion)
                .take(usize::from(SEARCH_LIMIT))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Address search failed");
                Vec::new()
            }
        }
    }

    /// The single best match for a full address, or `None` if the provider
    /// knows no such place.
    ///
    /// # Errors
    ///
    /// Returns `GeocodingError` if the provider is unreachable, answers with
    /// a non-success status, or returns a best match whose coordinates are
    /// not numbers.
    #[instrument(skip(self))]
    pub async fn geocode(&self, address: &str) -> Result<Option<AddressSuggestion>, GeocodingError> {
        if !is_searchable(address) {
            return Ok(None);
        }

        let places = self.lookup(address, 1).await?;
        let Some(best) = places.first() else {
            return Ok(None);
        };

        best.to_suggestion().map(Some).ok_or_else(|| {
            GeocodingError::Malformed(format!(
                "unusable coordinates for {:?}",
                best.display_name
            ))
        })
    }

    /// Raw provider lookup with caching.
    async fn lookup(
        &self,
        query: &str,
        limit: u8,
    ) -> Result<Arc<Vec<NominatimPlace>>, GeocodingError> {
        let cache_key = (normalize_query(query), limit);

        if let Some(places) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for geocoding query");
            return Ok(places);
        }

        let limit_param = limit.to_string();
        let response = self
            .inner
            .client
            .get(self.inner.search_url.clone())
            .query(&[
                ("q", query.trim()),
                ("format", "json"),
                ("limit", limit_param.as_str()),
                ("accept-language", "en"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Geocoding provider returned non-success status");
            return Err(GeocodingError::Status(status));
        }

        let body = response.text().await?;
        let places: Vec<NominatimPlace> = serde_json::from_str(&body).map_err(|e| {
            warn!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse geocoding response"
            );
            GeocodingError::Malformed(e.to_string())
        })?;

        let places = Arc::new(places);
        self.inner.cache.insert(cache_key, Arc::clone(&places)).await;
        Ok(places)
    }
}

fn is_searchable(query: &str) -> bool {
    query.trim().chars().count() >= MIN_QUERY_LENGTH
}

/// Lowercase and collapse whitespace so trivially different spellings share
/// a cache entry.
fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn unreachable_client() -> GeocodingClient {
        // Nothing listens on the discard port; any request would fail.
        GeocodingClient::new(&GeocoderConfig {
            base_url: Url::parse("http://127.0.0.1:9/nominatim").unwrap(),
            user_agent: "CustomerManager/test".to_string(),
            timeout: Duration::from_millis(200),
        })
        .unwrap()
    }

    #[test]
    fn test_search_url_keeps_base_path() {
        let client = unreachable_client();
        assert_eq!(
            client.inner.search_url.as_str(),
            "http://127.0.0.1:9/nominatim/search"
        );
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  123  Main\tSt "), "123 main st");
    }

    #[test]
    fn test_is_searchable_counts_trimmed_chars() {
        assert!(!is_searchable("ab"));
        assert!(!is_searchable("  ab  "));
        assert!(is_searchable("abc"));
        assert!(is_searchable("Zoë"));
    }

    #[tokio::test]
    async fn test_short_queries_never_reach_the_provider() {
        let client = unreachable_client();
        assert!(client.search("ab").await.is_empty());
        assert!(client.geocode("  x ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_is_empty_search_but_geocode_error() {
        let client = unreachable_client();
        assert!(client.search("123 Main St").await.is_empty());
        assert!(matches!(
            client.geocode("123 Main St").await,
            Err(GeocodingError::Http(_))
        ));
    }
}
