//! The signed-in user's profile.

use axum::{Json, extract::State};
use serde::Serialize;

use customer_manager_core::UserProfile;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserProfile,
}

/// `GET /api/v1/protected/profile`
pub async fn show(State(state): State<AppState>, auth: RequireAuth) -> Result<Json<ProfileResponse>> {
    let user = state.auth().profile(auth.user.uid).await?;
    Ok(Json(ProfileResponse { user }))
}
