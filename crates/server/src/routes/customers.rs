//! Customer CRUD for the signed-in user.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use customer_manager_core::{Customer, CustomerDraft, CustomerId, CustomerPatch};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::routes::JsonBody;
use crate::services::CustomerError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    q: Option<String>,
}

/// An id that is not a UUID cannot name a stored record.
fn parse_id(raw: &str) -> Result<CustomerId> {
    raw.parse()
        .map_err(|_| CustomerError::NotFound.into())
}

/// `GET /api/v1/protected/customers[?q=term]`
#[instrument(skip_all, fields(user_id = %auth.user.uid))]
pub async fn index(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Customer>>> {
    let customers = state
        .customers()
        .list(&auth.user, query.q.as_deref())
        .await?;
    Ok(Json(customers))
}

/// `POST /api/v1/protected/customers`
#[instrument(skip_all, fields(user_id = %auth.user.uid))]
pub async fn create(
    State(state): State<AppState>,
    auth: RequireAuth,
    JsonBody(draft): JsonBody<CustomerDraft>,
) -> Result<(StatusCode, Json<Customer>)> {
    let customer = state.customers().create(&auth.user, &draft).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

/// `GET /api/v1/protected/customers/{id}`
#[instrument(skip_all, fields(user_id = %auth.user.uid, customer_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<String>,
) -> Result<Json<Customer>> {
    let customer = state.customers().get(&auth.user, parse_id(&id)?).await?;
    Ok(Json(customer))
}

/// `PATCH /api/v1/protected/customers/{id}`
#[instrument(skip_all, fields(user_id = %auth.user.uid, customer_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<CustomerPatch>,
) -> Result<Json<Customer>> {
    let customer = state
        .customers()
        .update(&auth.user, parse_id(&id)?, &patch)
        .await?;
    Ok(Json(customer))
}

/// `DELETE /api/v1/protected/customers/{id}`
#[instrument(skip_all, fields(user_id = %auth.user.uid, customer_id = %id))]
pub async fn delete(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.customers().delete(&auth.user, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
