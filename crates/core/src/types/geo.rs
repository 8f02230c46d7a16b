//! Address suggestions produced by geocoding.

use serde::{Deserialize, Serialize};

use super::fields::Coordinates;

/// A geocoded address candidate.
///
/// Ephemeral: produced per lookup and consumed by the form that asked for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSuggestion {
    /// Human-readable, provider-formatted address.
    pub display_name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl AddressSuggestion {
    /// The suggestion's position.
    #[must_use]
    pub const fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_is_camel_case() {
        let suggestion = AddressSuggestion {
            display_name: "123 Main St, Springfield".to_owned(),
            latitude: 39.78,
            longitude: -89.65,
        };
        let json = serde_json::to_value(&suggestion).unwrap();
        assert_eq!(json["displayName"], "123 Main St, Springfield");
        assert_eq!(json["latitude"], 39.78);
    }
}
