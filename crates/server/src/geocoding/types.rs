//! Nominatim wire types.

use serde::Deserialize;

use customer_manager_core::{AddressSuggestion, Coordinates};

/// A coordinate as Nominatim sends it: a decimal string, or occasionally a
/// bare number from compatible providers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinate {
    Text(String),
    Number(f64),
}

impl RawCoordinate {
    fn parse(&self) -> Option<f64> {
        let value = match self {
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            Self::Number(n) => *n,
        };
        value.is_finite().then_some(value)
    }
}

/// One entry of a `/search?format=json` response. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NominatimPlace {
    pub display_name: String,
    pub lat: RawCoordinate,
    pub lon: RawCoordinate,
}

impl NominatimPlace {
    /// Convert to a suggestion, or `None` if the coordinates are not usable
    /// numbers in range.
    #[must_use]
    pub fn to_suggestion(&self) -> Option<AddressSuggestion> {
        let coordinates = Coordinates::new(self.lat.parse()?, self.lon.parse()?).ok()?;
        Some(AddressSuggestion {
            display_name: self.display_name.clone(),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_string_coordinates() {
        let places: Vec<NominatimPlace> = serde_json::from_str(
            r#"[{"place_id":1,"display_name":"Cape Town, South Africa","lat":"-33.9288","lon":"18.4172"}]"#,
        )
        .unwrap();
        let suggestion = places.first().unwrap().to_suggestion().unwrap();
        assert_eq!(suggestion.display_name, "Cape Town, South Africa");
        assert!((suggestion.latitude + 33.9288).abs() < 1e-9);
    }

    #[test]
    fn test_accepts_numeric_coordinates() {
        let place: NominatimPlace =
            serde_json::from_str(r#"{"display_name":"X","lat":1.5,"lon":2.5}"#).unwrap();
        assert_eq!(place.to_suggestion().unwrap().longitude, 2.5);
    }

    #[test]
    fn test_unparseable_or_out_of_range_coordinates_are_dropped() {
        let garbage: NominatimPlace =
            serde_json::from_str(r#"{"display_name":"X","lat":"north","lon":"2"}"#).unwrap();
        assert!(garbage.to_suggestion().is_none());

        let out_of_range: NominatimPlace =
            serde_json::from_str(r#"{"display_name":"X","lat":"95","lon":"2"}"#).unwrap();
        assert!(out_of_range.to_suggestion().is_none());

        let nan: NominatimPlace =
            serde_json::from_str(r#"{"display_name":"X","lat":"NaN","lon":"2"}"#).unwrap();
        assert!(nan.to_suggestion().is_none());
    }
}
