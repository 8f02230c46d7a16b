//! Geocoding endpoints and the address autocomplete field, end to end.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use customer_manager_client::{AddressAutocomplete, ClientError, SearchState};
use customer_manager_core::AddressSuggestion;
use customer_manager_integration_tests::TestServer;

async fn settled(field: &AddressAutocomplete) -> SearchState<Vec<AddressSuggestion>> {
    let mut changes = field.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = changes.borrow_and_update().clone();
            if !state.is_pending() {
                return state;
            }
            if changes.changed().await.is_err() {
                return state;
            }
        }
    })
    .await
    .expect("search settles")
}

#[tokio::test]
async fn test_short_query_makes_no_provider_call() {
    let server = TestServer::spawn().await;
    let http = reqwest::Client::new();

    let resp = http
        .get(server.api_url("autocomplete"))
        .query(&[("q", "ab")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap(), serde_json::json!([]));

    let resp = http
        .get(server.api_url("geocode"))
        .query(&[("q", " a ")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let api = server.api();
    assert!(api.autocomplete("12").await.unwrap().is_empty());
    assert_eq!(server.nominatim.hits(), 0);
}

#[tokio::test]
async fn test_missing_query_is_bad_request() {
    let server = TestServer::spawn().await;
    let resp = reqwest::get(server.api_url("geocode")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Query parameter q is required");
}

#[tokio::test]
async fn test_geocode_round_trip() {
    let server = TestServer::spawn().await;
    let found = server.api().geocode("123 Main St").await.unwrap().unwrap();

    assert_eq!(found.display_name, "123 Main St, Springfield, USA");
    assert!((found.latitude - 39.7817).abs() < 1e-9);
    assert!((found.longitude + 89.6501).abs() < 1e-9);
    assert_eq!(server.nominatim.queries(), vec!["123 Main St"]);
}

#[tokio::test]
async fn test_autocomplete_returns_at_most_five() {
    let server = TestServer::spawn().await;
    let suggestions = server.api().autocomplete("Main Street").await.unwrap();
    assert_eq!(suggestions.len(), 5);
    assert_eq!(
        suggestions.first().unwrap().display_name,
        "Main Street, Springfield, USA"
    );
}

#[tokio::test]
async fn test_unknown_address_is_not_found() {
    let server = TestServer::spawn().await;
    let resp = reqwest::Client::new()
        .get(server.api_url("geocode"))
        .query(&[("q", "1 Nowhere Lane")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Address not found");

    assert!(server.api().geocode("1 Nowhere Lane").await.unwrap().is_none());
}

#[tokio::test]
async fn test_provider_failure() {
    let server = TestServer::spawn().await;
    server.nominatim.fail(true);
    let api = server.api();

    // Geocode reports the outage, autocomplete degrades to no suggestions
    assert!(matches!(
        api.geocode("123 Main St").await,
        Err(ClientError::UpstreamUnavailable(_))
    ));
    assert!(api.autocomplete("123 Main St").await.unwrap().is_empty());

    // Failures are not cached
    server.nominatim.fail(false);
    assert!(api.geocode("123 Main St").await.unwrap().is_some());
}

#[tokio::test]
async fn test_repeated_queries_are_cached() {
    let server = TestServer::spawn().await;
    let api = server.api();

    api.geocode("123 Main St").await.unwrap();
    api.geocode("  123 MAIN st ").await.unwrap();
    assert_eq!(server.nominatim.hits(), 1);

    // A different limit is a different lookup
    api.autocomplete("123 Main St").await.unwrap();
    assert_eq!(server.nominatim.hits(), 2);
}

#[tokio::test]
async fn test_autocomplete_debounces_keystrokes() {
    let server = TestServer::spawn().await;
    let mut field = AddressAutocomplete::with_delay(server.api(), Duration::from_millis(150));

    field.input("a");
    field.input("ab");
    field.input("abc");

    let state = settled(&field).await;
    assert_eq!(server.nominatim.queries(), vec!["abc"]);
    let results = state.results().unwrap();
    assert_eq!(results.first().unwrap().display_name, "abc, Springfield, USA");
}

#[tokio::test]
async fn test_submit_without_choice_geocodes_typed_address() {
    let server = TestServer::spawn().await;
    let mut field = AddressAutocomplete::with_delay(server.api(), Duration::from_millis(50));
    field.input("123 Main St");
    let geo = field.resolve_for_submit().await.unwrap();
    assert_eq!(geo.formatted_address, "123 Main St, Springfield, USA");
}

#[tokio::test]
async fn test_api_rate_limit_answers_json() {
    use customer_manager_server::config::{RateLimit, RateLimitConfig};

    let limit = RateLimit {
        period_secs: 60,
        burst: 2,
    };
    let server = TestServer::spawn_with_limits(RateLimitConfig {
        api: limit,
        auth: limit,
    })
    .await;
    let http = reqwest::Client::new();

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let resp = http
            .get(server.api_url("autocomplete"))
            .query(&[("q", "ab")])
            .send()
            .await
            .unwrap();
        statuses.push(resp.status());
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["error"], "Too many requests");
        }
    }
    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );
}
