//! Address autocomplete for the customer form.
//!
//! Typing feeds a 400 ms debounced pipeline of geocoding suggestions.
//! Choosing one fills the geo fields; submitting without a choice falls back
//! to one geocode of the typed address.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use customer_manager_core::{AddressSuggestion, CustomerPatch};

use crate::api::{ApiClient, MIN_QUERY_LENGTH};
use crate::debounce::{Resolver, SearchPipeline, SearchState};
use crate::error::ClientError;

/// Wait after the last keystroke before asking for suggestions.
pub const AUTOCOMPLETE_DEBOUNCE: Duration = Duration::from_millis(400);

/// Geocode-derived fields of a customer.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFields {
    pub formatted_address: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&AddressSuggestion> for GeoFields {
    fn from(suggestion: &AddressSuggestion) -> Self {
        Self {
            formatted_address: suggestion.display_name.clone(),
            latitude: suggestion.latitude,
            longitude: suggestion.longitude,
        }
    }
}

/// Point the geo fields of an edit at a re-geocoded address.
///
/// With no result the formatted address is sent empty, which also clears the
/// stored coordinates.
pub fn set_geo_fields(patch: &mut CustomerPatch, found: Option<GeoFields>) {
    match found {
        Some(geo) => {
            patch.formatted_address = Some(geo.formatted_address);
            patch.latitude = Some(geo.latitude);
            patch.longitude = Some(geo.longitude);
        }
        None => {
            patch.formatted_address = Some(String::new());
            patch.latitude = None;
            patch.longitude = None;
        }
    }
}

struct SuggestionResolver {
    api: ApiClient,
}

#[async_trait]
impl Resolver<Vec<AddressSuggestion>> for SuggestionResolver {
    async fn resolve(&self, query: &str) -> Result<Vec<AddressSuggestion>, ClientError> {
        self.api.autocomplete(query).await
    }
}

/// State of one address field.
pub struct AddressAutocomplete {
    api: ApiClient,
    pipeline: SearchPipeline<Vec<AddressSuggestion>>,
    text: String,
    chosen: Option<AddressSuggestion>,
}

impl AddressAutocomplete {
    /// Create an empty field.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self::with_delay(api, AUTOCOMPLETE_DEBOUNCE)
    }

    /// Create an empty field with a custom debounce window.
    #[must_use]
    pub fn with_delay(api: ApiClient, delay: Duration) -> Self {
        let resolver = Arc::new(SuggestionResolver { api: api.clone() });
        Self {
            api,
            pipeline: SearchPipeline::new(delay, resolver),
            text: String::new(),
            chosen: None,
        }
    }

    /// The address text as typed or chosen.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The chosen suggestion, if it still matches the text.
    #[must_use]
    pub const fn chosen(&self) -> Option<&AddressSuggestion> {
        self.chosen.as_ref()
    }

    /// Current suggestions state.
    #[must_use]
    pub fn suggestions(&self) -> SearchState<Vec<AddressSuggestion>> {
        self.pipeline.state()
    }

    /// Watch suggestion changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SearchState<Vec<AddressSuggestion>>> {
        self.pipeline.subscribe()
    }

    /// The user typed; short text hides suggestions without a lookup.
    pub fn input(&mut self, text: impl Into<String>) {
        self.text = text.into();
        if self
            .chosen
            .as_ref()
            .is_some_and(|c| c.display_name != self.text)
        {
            self.chosen = None;
        }

        if self.text.trim().chars().count() < MIN_QUERY_LENGTH {
            self.pipeline.clear();
        } else {
            self.pipeline.input(self.text.clone());
        }
    }

    /// The user picked a suggestion.
    pub fn choose(&mut self, suggestion: AddressSuggestion) {
        self.text.clone_from(&suggestion.display_name);
        self.chosen = Some(suggestion);
        self.pipeline.clear();
    }

    /// Geo fields for submit.
    ///
    /// Uses the chosen suggestion, otherwise one geocode of the typed text.
    /// A failed or empty geocode yields `None`; it never fails the submit.
    pub async fn resolve_for_submit(&self) -> Option<GeoFields> {
        if let Some(chosen) = &self.chosen {
            return Some(GeoFields::from(chosen));
        }
        if self.text.trim().is_empty() {
            return None;
        }

        match self.api.geocode(&self.text).await {
            Ok(found) => found.as_ref().map(GeoFields::from),
            Err(e) => {
                tracing::warn!(error = %e, "Geocoding on submit failed; saving without coordinates");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;
    use crate::config::ClientConfig;

    fn field() -> AddressAutocomplete {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:9").unwrap());
        AddressAutocomplete::new(ApiClient::new(&config).unwrap())
    }

    fn suggestion() -> AddressSuggestion {
        AddressSuggestion {
            display_name: "123 Main St, Springfield".to_string(),
            latitude: 39.78,
            longitude: -89.65,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_input_stays_idle() {
        let mut field = field();
        field.input("12");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(field.suggestions(), SearchState::Idle);
    }

    #[tokio::test]
    async fn test_choosing_fills_geo_fields() {
        let mut field = field();
        field.input("123 Main");
        field.choose(suggestion());

        assert_eq!(field.text(), "123 Main St, Springfield");
        assert_eq!(field.suggestions(), SearchState::Idle);
        let geo = field.resolve_for_submit().await.unwrap();
        assert_eq!(geo.formatted_address, "123 Main St, Springfield");
        assert!((geo.latitude - 39.78).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_editing_after_choice_forgets_it() {
        let mut field = field();
        field.choose(suggestion());
        field.input("124 Main St");
        assert!(field.chosen().is_none());
    }

    #[tokio::test]
    async fn test_failed_geocode_does_not_fail_submit() {
        let mut field = field();
        field.input("123 Main St");
        // The API is unreachable, so the fallback geocode fails
        assert!(field.resolve_for_submit().await.is_none());
    }

    #[test]
    fn test_missing_geocode_clears_geo_fields_of_edit() {
        let mut patch = CustomerPatch {
            address: Some("9 Long Street".to_owned()),
            latitude: Some(1.0),
            ..CustomerPatch::default()
        };
        set_geo_fields(&mut patch, None);

        assert_eq!(patch.formatted_address.as_deref(), Some(""));
        assert_eq!(patch.latitude, None);
        let changes = patch.validate().unwrap();
        assert_eq!(changes.formatted_address, Some(None));
        assert_eq!((changes.latitude, changes.longitude), (Some(None), Some(None)));
    }

    #[test]
    fn test_geocode_result_fills_edit() {
        let mut patch = CustomerPatch::default();
        set_geo_fields(&mut patch, Some(GeoFields::from(&suggestion())));

        assert_eq!(
            patch.formatted_address.as_deref(),
            Some("123 Main St, Springfield")
        );
        assert!(patch.latitude.is_some() && patch.longitude.is_some());
    }
}
