//! Integration test harness for Customer Manager.
//!
//! Each [`TestServer`] runs the real API router on an ephemeral port, backed
//! by the in-memory stores and a fake Nominatim that counts its hits. No
//! database or network access is needed.
//!
//! ```bash
//! cargo test -p customer-manager-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::json;
use tokio::net::TcpListener;
use url::Url;

use customer_manager_client::{ApiClient, AuthSession, ClientConfig, CustomerClient};
use customer_manager_core::CustomerDraft;
use customer_manager_server::config::{RateLimit, RateLimitConfig, ServerConfig};
use customer_manager_server::state::AppState;

/// Addresses containing this never match.
pub const UNKNOWN_ADDRESS_MARKER: &str = "nowhere";

const TEST_TOKEN_SECRET: &str = "q7Lm2xVt9RkP4wZc8NbJ3hYf6GdS1aEu";

// =============================================================================
// Fake geocoding provider
// =============================================================================

#[derive(Default)]
struct ProviderState {
    hits: AtomicUsize,
    queries: std::sync::Mutex<Vec<String>>,
    failing: AtomicBool,
}

/// A stand-in for the Nominatim `/search` endpoint.
///
/// Answers every query with `limit` places named after it, all at the same
/// coordinates, unless it contains [`UNKNOWN_ADDRESS_MARKER`].
#[derive(Clone)]
pub struct FakeNominatim {
    url: Url,
    state: Arc<ProviderState>,
}

impl FakeNominatim {
    /// Start the provider on an ephemeral port.
    pub async fn spawn() -> Self {
        let state = Arc::new(ProviderState::default());
        let app = Router::new()
            .route("/search", get(search))
            .with_state(Arc::clone(&state));

        let (listener, addr) = bind().await;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            url: Url::parse(&format!("http://{addr}/")).expect("valid provider URL"),
            state,
        }
    }

    #[must_use]
    pub fn url(&self) -> Url {
        self.url.clone()
    }

    /// Requests received so far.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// The `q` parameter of every request received, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.state
            .queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }

    /// Make every following request answer 503.
    pub fn fail(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }
}

async fn search(
    State(state): State<Arc<ProviderState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let query = params.get("q").cloned().unwrap_or_default();
    if let Ok(mut queries) = state.queries.lock() {
        queries.push(query.clone());
    }

    if state.failing.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "upstream down").into_response();
    }
    if query.to_lowercase().contains(UNKNOWN_ADDRESS_MARKER) {
        return Json(json!([])).into_response();
    }

    let limit: usize = params
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(1);
    let places: Vec<_> = (0..limit)
        .map(|i| {
            let name = if i == 0 {
                format!("{query}, Springfield, USA")
            } else {
                format!("{query} #{i}, Springfield, USA")
            };
            json!({
                "place_id": i,
                "display_name": name,
                "lat": "39.7817",
                "lon": "-89.6501",
            })
        })
        .collect();
    Json(places).into_response()
}

// =============================================================================
// API server
// =============================================================================

/// A running API server with in-memory stores.
pub struct TestServer {
    pub url: Url,
    pub state: AppState,
    pub nominatim: FakeNominatim,
}

impl TestServer {
    /// Start with rate limits high enough to never trigger.
    pub async fn spawn() -> Self {
        let generous = RateLimit {
            period_secs: 1,
            burst: 10_000,
        };
        Self::spawn_with_limits(RateLimitConfig {
            api: generous,
            auth: generous,
        })
        .await
    }

    /// Start with explicit rate limits.
    pub async fn spawn_with_limits(rate_limits: RateLimitConfig) -> Self {
        let nominatim = FakeNominatim::spawn().await;

        let mut config = ServerConfig::in_memory(SecretString::from(TEST_TOKEN_SECRET));
        config.geocoder.base_url = nominatim.url();
        config.geocoder.timeout = Duration::from_secs(5);
        config.rate_limits = rate_limits;

        let state = AppState::from_config(config)
            .await
            .expect("in-memory state builds");
        let app = customer_manager_server::build_router(state.clone());
        let (listener, addr) = bind().await;
        tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
        });

        Self {
            url: Url::parse(&format!("http://{addr}/")).expect("valid server URL"),
            state,
            nominatim,
        }
    }

    /// Absolute URL of an API path such as `auth/login`.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}api/v1/{path}", self.url)
    }

    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.url.clone())
    }

    /// A fresh, signed-out API client.
    #[must_use]
    pub fn api(&self) -> ApiClient {
        ApiClient::new(&self.client_config()).expect("client builds")
    }

    /// A fresh session, settled as signed out.
    pub async fn session(&self) -> AuthSession {
        let session = AuthSession::new(self.api());
        session.restore(None).await.expect("restore without token");
        session
    }

    /// A session for a newly registered user.
    pub async fn signed_in(&self, email: &str) -> AuthSession {
        let session = self.session().await;
        session
            .sign_up(email, "correct-horse-battery", "Test User")
            .await
            .expect("registration succeeds");
        session
    }

    /// Customer operations for a newly registered user.
    pub async fn customers_for(&self, email: &str) -> CustomerClient {
        CustomerClient::new(self.signed_in(email).await)
    }
}

/// A valid record for `email` at "123 Main St".
#[must_use]
pub fn sample_draft(email: &str) -> CustomerDraft {
    CustomerDraft {
        id_number: "9001015009087".to_string(),
        first_name: "Ana".to_string(),
        last_name: "Diaz".to_string(),
        email: email.to_string(),
        phone: Some("+27 21 555 0100".to_string()),
        address: "123 Main St".to_string(),
        ..CustomerDraft::default()
    }
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local address");
    (listener, addr)
}
