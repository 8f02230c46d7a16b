//! Sign-up, sign-in, sign-out and password reset.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{Result, clear_sentry_user};
use crate::middleware::RequireAuth;
use crate::routes::JsonBody;
use crate::services::IssuedToken;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    #[serde(default)]
    email: String,
}

#[derive(Deserialize)]
pub struct PasswordResetConfirm {
    #[serde(default)]
    token: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

/// `POST /api/v1/auth/register`
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(form): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<IssuedToken>)> {
    let issued = state
        .auth()
        .register(&form.email, &form.password, &form.display_name)
        .await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

/// `POST /api/v1/auth/login`
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(form): JsonBody<LoginRequest>,
) -> Result<Json<IssuedToken>> {
    let issued = state.auth().login(&form.email, &form.password).await?;
    Ok(Json(issued))
}

/// `POST /api/v1/auth/logout`
///
/// Revokes the presented token.
#[instrument(skip_all, fields(user_id = %auth.user.uid))]
pub async fn logout(State(state): State<AppState>, auth: RequireAuth) -> StatusCode {
    state.auth().logout(&auth.claims).await;
    clear_sentry_user();
    StatusCode::NO_CONTENT
}

/// `POST /api/v1/auth/password-reset`
///
/// Always accepted, whether or not the email belongs to an account.
#[instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    JsonBody(form): JsonBody<PasswordResetRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    state.auth().request_password_reset(&form.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Message {
            message: "If an account exists for that email, a reset link has been sent",
        }),
    ))
}

/// `POST /api/v1/auth/password-reset/confirm`
#[instrument(skip_all)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    JsonBody(form): JsonBody<PasswordResetConfirm>,
) -> Result<StatusCode> {
    state
        .auth()
        .confirm_password_reset(&form.token, &form.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
