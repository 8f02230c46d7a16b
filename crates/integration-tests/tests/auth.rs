//! Accounts, sessions and password reset, end to end.

use reqwest::StatusCode;
use serde_json::{Value, json};

use customer_manager_client::{AuthSession, ClientError};
use customer_manager_integration_tests::TestServer;
use customer_manager_server::config::{RateLimit, RateLimitConfig};

const PASSWORD: &str = "correct-horse-battery";

#[tokio::test]
async fn test_register_login_and_profile() {
    let server = TestServer::spawn().await;
    let session = server.session().await;

    let user = session
        .sign_up("ana@example.com", PASSWORD, "Ana")
        .await
        .unwrap();
    assert_eq!(user.email.as_str(), "ana@example.com");
    assert!(session.state().authenticated());

    let profile = session.api().profile().await.unwrap();
    assert_eq!(profile.uid, user.uid);
    assert_eq!(profile.display_name, "Ana");

    let other = server.session().await;
    let again = other.sign_in("ana@EXAMPLE.com", PASSWORD).await.unwrap();
    assert_eq!(again.uid, user.uid);
}

#[tokio::test]
async fn test_wrong_password_and_unknown_email_look_alike() {
    let server = TestServer::spawn().await;
    server.signed_in("ana@example.com").await;
    let session = server.session().await;

    let wrong = session.sign_in("ana@example.com", "wrong-password").await;
    let unknown = session.sign_in("nobody@example.com", PASSWORD).await;
    let (Err(ClientError::Unauthorized(a)), Err(ClientError::Unauthorized(b))) = (wrong, unknown)
    else {
        panic!("expected both sign-ins to be rejected");
    };
    assert_eq!(a, "Invalid email or password");
    assert_eq!(a, b);
    assert!(!session.state().authenticated());
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let server = TestServer::spawn().await;
    server.signed_in("ana@example.com").await;

    let session = server.session().await;
    assert!(matches!(
        session.sign_up("ana@example.com", PASSWORD, "Ana Again").await,
        Err(ClientError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_register_validates_every_field() {
    let server = TestServer::spawn().await;
    let resp = reqwest::Client::new()
        .post(server.api_url("auth/register"))
        .json(&json!({ "email": "bad", "password": "123", "displayName": "A" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    let details = body["details"].as_object().unwrap();
    assert!(details.contains_key("email"));
    assert!(details.contains_key("password"));
    assert!(details.contains_key("displayName"));
}

#[tokio::test]
async fn test_stored_token_restores_the_session() {
    let server = TestServer::spawn().await;
    let original = server.signed_in("ana@example.com").await;
    let token = original.token().unwrap();

    let restored = AuthSession::new(server.api());
    assert!(restored.state().loading);
    restored.restore(Some(token)).await.unwrap();
    let state = restored.state();
    assert!(!state.loading);
    assert_eq!(state.user, original.current_user());

    let stale = AuthSession::new(server.api());
    stale.restore(Some("garbage".to_string())).await.unwrap();
    assert!(!stale.state().authenticated());
    assert!(stale.api().token().is_none());
}

#[tokio::test]
async fn test_logout_revokes_the_token() {
    let server = TestServer::spawn().await;
    let session = server.signed_in("ana@example.com").await;
    let token = session.token().unwrap();

    session.sign_out().await.unwrap();
    assert!(session.current_user().is_none());

    let resp = reqwest::Client::new()
        .get(server.api_url("protected/profile"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let server = TestServer::spawn().await;
    server.signed_in("ana@example.com").await;
    let session = server.session().await;

    // Always accepted, known address or not
    session
        .request_password_reset("nobody@example.com")
        .await
        .unwrap();
    session.request_password_reset("ana@example.com").await.unwrap();

    let ticket = server
        .state
        .auth()
        .request_password_reset("ana@example.com")
        .await
        .unwrap()
        .unwrap();

    session
        .confirm_password_reset(&ticket.token, "a-brand-new-secret")
        .await
        .unwrap();

    // Single use
    assert!(matches!(
        session
            .confirm_password_reset(&ticket.token, "yet-another-secret")
            .await,
        Err(ClientError::BadRequest(_))
    ));

    assert!(matches!(
        session.sign_in("ana@example.com", PASSWORD).await,
        Err(ClientError::Unauthorized(_))
    ));
    session
        .sign_in("ana@example.com", "a-brand-new-secret")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_auth_endpoints_are_rate_limited() {
    let generous = RateLimit {
        period_secs: 1,
        burst: 10_000,
    };
    let server = TestServer::spawn_with_limits(RateLimitConfig {
        api: generous,
        auth: RateLimit {
            period_secs: 60,
            burst: 3,
        },
    })
    .await;
    let session = server.session().await;

    for _ in 0..3 {
        assert!(matches!(
            session.sign_in("nobody@example.com", PASSWORD).await,
            Err(ClientError::Unauthorized(_))
        ));
    }
    assert!(matches!(
        session.sign_in("nobody@example.com", PASSWORD).await,
        Err(ClientError::RateLimited)
    ));
}
