//! Public geocoding endpoints.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use customer_manager_core::AddressSuggestion;

use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    q: Option<String>,
}

impl AddressQuery {
    fn required(self) -> Result<String> {
        self.q
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::BadRequest("Query parameter q is required".to_string()))
    }
}

/// Best match for a full address.
///
/// `GET /api/v1/geocode?q=...`
#[instrument(skip(state))]
pub async fn geocode(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<AddressSuggestion>> {
    let address = query.required()?;
    state
        .geocoder()
        .geocode(&address)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Address not found".to_string()))
}

/// Up to five candidates for a partial address.
///
/// `GET /api/v1/autocomplete?q=...`
#[instrument(skip(state))]
pub async fn autocomplete(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<Vec<AddressSuggestion>>> {
    let partial = query.required()?;
    Ok(Json(state.geocoder().search(&partial).await))
}
