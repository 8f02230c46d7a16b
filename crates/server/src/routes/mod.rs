//! HTTP route handlers.
//!
//! # Route Structure
//!
//! Every route shares the per-IP API limit; auth routes add a stricter one.
//!
//! ```text
//! GET    /api/v1/health                     - Liveness
//! GET    /api/v1/health/ready               - Readiness (store reachable)
//!
//! # Geocoding (public)
//! GET    /api/v1/geocode?q=                 - Best match for an address
//! GET    /api/v1/autocomplete?q=            - Up to five candidates
//!
//! # Auth (strictly rate limited)
//! POST   /api/v1/auth/register
//! POST   /api/v1/auth/login
//! POST   /api/v1/auth/logout                - Revokes the bearer token
//! POST   /api/v1/auth/password-reset
//! POST   /api/v1/auth/password-reset/confirm
//!
//! # Protected (bearer token)
//! GET    /api/v1/protected/profile
//! GET    /api/v1/protected/customers        - Own records, newest first
//! POST   /api/v1/protected/customers
//! GET    /api/v1/protected/customers/{id}
//! PATCH  /api/v1/protected/customers/{id}
//! DELETE /api/v1/protected/customers/{id}
//! ```

pub mod auth;
pub mod customers;
pub mod geocode;
pub mod health;
pub mod profile;

use axum::{
    Router,
    extract::FromRequest,
    middleware::map_response,
    routing::{get, post},
};

use crate::config::RateLimitConfig;
use crate::error::AppError;
use crate::middleware::{api_rate_limiter, auth_rate_limiter, rate_limit_json};
use crate::state::AppState;

/// JSON request body whose rejections use the API error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Create the geocoding routes router.
pub fn geocode_routes() -> Router<AppState> {
    Router::new()
        .route("/geocode", get(geocode::geocode))
        .route("/autocomplete", get(geocode::autocomplete))
}

/// Create the auth routes router.
pub fn auth_routes(limits: &RateLimitConfig) -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/password-reset", post(auth::request_password_reset))
        .route(
            "/password-reset/confirm",
            post(auth::confirm_password_reset),
        )
        .layer(auth_rate_limiter(limits.auth))
        .layer(map_response(rate_limit_json))
}

/// Create the protected routes router.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile::show))
        .route(
            "/customers",
            get(customers::index).post(customers::create),
        )
        .route(
            "/customers/{id}",
            get(customers::show)
                .patch(customers::update)
                .delete(customers::delete),
        )
}

/// Create all API routes.
pub fn routes(limits: &RateLimitConfig) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(geocode_routes())
        .nest("/auth", auth_routes(limits))
        .nest("/protected", protected_routes())
        .layer(api_rate_limiter(limits.api))
        .layer(map_response(rate_limit_json))
}

/// Fallback for unknown routes.
pub async fn not_found() -> AppError {
    AppError::NotFound("Not found".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::SocketAddr;

    use axum::{
        body::{Body, to_bytes},
        extract::ConnectInfo,
        http::{Request, StatusCode},
    };
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::config::{RateLimit, ServerConfig};
    use crate::state::AppState;

    fn app() -> axum::Router {
        app_with(ServerConfig::in_memory(SecretString::from(
            "Zq8#mV2!pL5@xR9$kT3&wN7*bH4^cJ6%",
        )))
    }

    fn app_with(config: ServerConfig) -> axum::Router {
        let state = AppState::with_stores(
            config,
            std::sync::Arc::new(crate::db::MemoryCustomerStore::new()),
            std::sync::Arc::new(crate::db::MemoryUserStore::new()),
            None,
        )
        .unwrap();
        crate::build_router(state)
    }

    async fn send(
        app: &axum::Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let mut request = builder.body(body).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), "GET", "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_readiness_with_memory_store() {
        let (status, _) = send(&app(), "GET", "/api/v1/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let (status, body) = send(&app(), "GET", "/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Not found" }));
    }

    #[tokio::test]
    async fn test_missing_query_is_400() {
        let app = app();
        for uri in ["/api/v1/geocode", "/api/v1/autocomplete?q="] {
            let (status, body) = send(&app, "GET", uri, None, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({ "error": "Query parameter q is required" }));
        }
    }

    #[tokio::test]
    async fn test_short_autocomplete_is_empty() {
        let (status, body) = send(&app(), "GET", "/api/v1/autocomplete?q=ab", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_protected_routes_require_a_token() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/v1/protected/customers", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");

        let (status, _) =
            send(&app, "GET", "/api/v1/protected/profile", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_then_create_and_list() {
        let app = app();
        let (status, registered) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "email": "owner@example.com",
                "password": "secret1",
                "displayName": "Owner"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let token = registered["token"].as_str().unwrap().to_string();

        let (status, created) = send(
            &app,
            "POST",
            "/api/v1/protected/customers",
            Some(&token),
            Some(json!({
                "idNumber": "8001015009087",
                "firstName": "Sipho",
                "lastName": "Dlamini",
                "email": "sipho@example.com",
                "address": "123 Main St"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["createdBy"], registered["user"]["uid"]);

        let (status, listed) =
            send(&app, "GET", "/api/v1/protected/customers", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, profile) =
            send(&app, "GET", "/api/v1/protected/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["user"]["role"], "user");
    }

    #[tokio::test]
    async fn test_invalid_customer_is_422_with_details() {
        let app = app();
        let (_, registered) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "email": "v@example.com",
                "password": "secret1",
                "displayName": "Val"
            })),
        )
        .await;
        let token = registered["token"].as_str().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/protected/customers",
            Some(token),
            Some(json!({ "idNumber": "12" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["details"]["idNumber"].is_string());
        assert!(body["details"]["firstName"].is_string());
    }

    #[tokio::test]
    async fn test_api_limit_covers_protected_and_health() {
        let mut config =
            ServerConfig::in_memory(SecretString::from("Zq8#mV2!pL5@xR9$kT3&wN7*bH4^cJ6%"));
        config.rate_limits.api = RateLimit {
            period_secs: 60,
            burst: 2,
        };
        let app = app_with(config);

        let (first, _) = send(&app, "GET", "/api/v1/protected/profile", None, None).await;
        let (second, _) = send(&app, "GET", "/api/v1/protected/customers", None, None).await;
        assert_eq!((first, second), (StatusCode::UNAUTHORIZED, StatusCode::UNAUTHORIZED));

        let (status, body) = send(&app, "GET", "/api/v1/protected/profile", None, None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body, json!({ "error": "Too many requests" }));

        let (status, _) = send(&app, "GET", "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let app = app();
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
