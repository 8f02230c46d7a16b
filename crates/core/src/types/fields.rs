//! Validated customer and account fields.
//!
//! Each newtype can only be constructed through `parse`, so a value that
//! reaches the store has already passed the same rules on every side.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::email::EmailError;

/// Why a single field was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// The field is missing or blank.
    #[error("is required")]
    Required,
    /// The field is shorter than allowed.
    #[error("must be at least {min} characters")]
    TooShort {
        /// Minimum length in characters.
        min: usize,
    },
    /// The field is longer than allowed.
    #[error("must be at most {max} characters")]
    TooLong {
        /// Maximum length in characters.
        max: usize,
    },
    /// The field has the wrong exact length.
    #[error("must be exactly {expected} digits")]
    WrongLength {
        /// Required length.
        expected: usize,
    },
    /// The field must contain only digits.
    #[error("must contain only digits")]
    NotDigits,
    /// The field contains characters outside its alphabet.
    #[error("contains invalid characters")]
    InvalidCharacters,
    /// A numeric field is out of range.
    #[error("must be between {min} and {max}")]
    OutOfRange {
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// The email address is malformed.
    #[error("is not a valid email address ({0})")]
    Email(#[from] EmailError),
}

/// Field-level validation failures, keyed by the wire (camelCase) field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    /// Create an empty error set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field`. The first failure per field wins.
    pub fn add(&mut self, field: &str, error: &FieldError) {
        self.0
            .entry(field.to_owned())
            .or_insert_with(|| format!("{field} {error}"));
    }

    /// Record the error of `result` under `field` and return the value, if any.
    pub fn check<T>(&mut self, field: &str, result: Result<T, FieldError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.add(field, &error);
                None
            }
        }
    }

    /// Whether no failures were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `field` failed.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// The recorded failures.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.0.values().cloned().collect::<Vec<_>>().join("; ");
        f.write_str(&joined)
    }
}

impl std::error::Error for ValidationErrors {}

fn check_length(value: &str, min: usize, max: usize) -> Result<(), FieldError> {
    let len = value.chars().count();
    if len == 0 {
        return Err(FieldError::Required);
    }
    if len < min {
        return Err(FieldError::TooShort { min });
    }
    if len > max {
        return Err(FieldError::TooLong { max });
    }
    Ok(())
}

macro_rules! string_newtype {
    ($name:ident) => {
        impl $name {
            /// Returns the value as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper and returns the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = FieldError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

/// A 13-digit national identity number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdNumber(String);

impl IdNumber {
    /// Required number of digits.
    pub const LENGTH: usize = 13;

    /// Parse an identity number.
    ///
    /// # Errors
    ///
    /// Returns `FieldError::NotDigits` for any non-digit character and
    /// `FieldError::WrongLength` unless there are exactly 13 digits.
    pub fn parse(s: &str) -> Result<Self, FieldError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FieldError::Required);
        }
        if !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(FieldError::NotDigits);
        }
        if s.len() != Self::LENGTH {
            return Err(FieldError::WrongLength {
                expected: Self::LENGTH,
            });
        }
        Ok(Self(s.to_owned()))
    }
}

string_newtype!(IdNumber);

/// A first or last name: letters, spaces, apostrophes and hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersonName(String);

impl PersonName {
    /// Maximum length in characters.
    pub const MAX_LENGTH: usize = 100;

    /// Parse a person name.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed name is empty, too long, or contains
    /// anything other than letters, spaces, `'` and `-`.
    pub fn parse(s: &str) -> Result<Self, FieldError> {
        let s = s.trim();
        check_length(s, 1, Self::MAX_LENGTH)?;
        if !s
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ' || c == '\'' || c == '-')
        {
            return Err(FieldError::InvalidCharacters);
        }
        Ok(Self(s.to_owned()))
    }
}

string_newtype!(PersonName);

/// A phone number: 10-20 characters of digits, spaces and `-+()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Parse a phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the number has characters outside the allowed set
    /// or is not 10-20 characters long.
    pub fn parse(s: &str) -> Result<Self, FieldError> {
        let s = s.trim();
        if !s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '+' | '(' | ')'))
        {
            return Err(FieldError::InvalidCharacters);
        }
        check_length(s, 10, 20)?;
        Ok(Self(s.to_owned()))
    }

    /// Parse an optional phone number, treating blank input as "none".
    ///
    /// # Errors
    ///
    /// Returns an error if a non-blank value fails [`Phone::parse`].
    pub fn parse_optional(s: Option<&str>) -> Result<Option<Self>, FieldError> {
        match s.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => Self::parse(value).map(Some),
        }
    }
}

string_newtype!(Phone);

/// A free-text street address as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreetAddress(String);

impl StreetAddress {
    /// Minimum length in characters.
    pub const MIN_LENGTH: usize = 5;
    /// Maximum length in characters.
    pub const MAX_LENGTH: usize = 500;

    /// Parse a street address.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed address is outside 5-500 characters.
    pub fn parse(s: &str) -> Result<Self, FieldError> {
        let s = s.trim();
        check_length(s, Self::MIN_LENGTH, Self::MAX_LENGTH)?;
        Ok(Self(s.to_owned()))
    }
}

string_newtype!(StreetAddress);

/// An account display name (2-100 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
    /// Parse a display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed name is outside 2-100 characters.
    pub fn parse(s: &str) -> Result<Self, FieldError> {
        let s = s.trim();
        check_length(s, 2, 100)?;
        Ok(Self(s.to_owned()))
    }
}

string_newtype!(DisplayName);

/// A plaintext password that met the minimum policy. Never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Minimum length in characters.
    pub const MIN_LENGTH: usize = 6;

    /// Check a password against the policy.
    ///
    /// # Errors
    ///
    /// Returns `FieldError::TooShort` below six characters.
    pub fn parse(s: &str) -> Result<Self, FieldError> {
        if s.is_empty() {
            return Err(FieldError::Required);
        }
        if s.chars().count() < Self::MIN_LENGTH {
            return Err(FieldError::TooShort {
                min: Self::MIN_LENGTH,
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// The plaintext, for hashing.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees (-90..=90).
    pub latitude: f64,
    /// Longitude in degrees (-180..=180).
    pub longitude: f64,
}

impl Coordinates {
    /// Validate a coordinate pair.
    ///
    /// # Errors
    ///
    /// Returns `(field, error)` for the first component that is non-finite or
    /// out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, (&'static str, FieldError)> {
        let latitude = Self::latitude(latitude).map_err(|e| ("latitude", e))?;
        let longitude = Self::longitude(longitude).map_err(|e| ("longitude", e))?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Check a latitude in degrees.
    ///
    /// # Errors
    ///
    /// Returns `FieldError::OutOfRange` outside -90..=90 (NaN included).
    pub fn latitude(value: f64) -> Result<f64, FieldError> {
        check_range(value, 90.0)
    }

    /// Check a longitude in degrees.
    ///
    /// # Errors
    ///
    /// Returns `FieldError::OutOfRange` outside -180..=180 (NaN included).
    pub fn longitude(value: f64) -> Result<f64, FieldError> {
        check_range(value, 180.0)
    }
}

fn check_range(value: f64, bound: f64) -> Result<f64, FieldError> {
    if (-bound..=bound).contains(&value) {
        Ok(value)
    } else {
        Err(FieldError::OutOfRange {
            min: -bound,
            max: bound,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_number_accepts_thirteen_digits() {
        assert_eq!(
            IdNumber::parse(" 9001015009087 ").unwrap().as_str(),
            "9001015009087"
        );
    }

    #[test]
    fn test_id_number_rejects_letters_and_wrong_length() {
        assert_eq!(IdNumber::parse("90010150090AB"), Err(FieldError::NotDigits));
        assert_eq!(
            IdNumber::parse("123"),
            Err(FieldError::WrongLength { expected: 13 })
        );
        assert_eq!(IdNumber::parse(""), Err(FieldError::Required));
    }

    #[test]
    fn test_person_name_alphabet() {
        assert!(PersonName::parse("Mary-Jane O'Neil").is_ok());
        assert!(PersonName::parse("Zoë").is_ok());
        assert_eq!(
            PersonName::parse("R2D2"),
            Err(FieldError::InvalidCharacters)
        );
        assert_eq!(
            PersonName::parse(&"a".repeat(101)),
            Err(FieldError::TooLong { max: 100 })
        );
    }

    #[test]
    fn test_phone_optional_blank_is_none() {
        assert_eq!(Phone::parse_optional(Some("  ")).unwrap(), None);
        assert_eq!(Phone::parse_optional(None).unwrap(), None);
        assert!(Phone::parse_optional(Some("+27 (21) 555-0100")).unwrap().is_some());
        assert_eq!(Phone::parse("12345"), Err(FieldError::TooShort { min: 10 }));
        assert_eq!(
            Phone::parse("call me maybe"),
            Err(FieldError::InvalidCharacters)
        );
    }

    #[test]
    fn test_street_address_bounds() {
        assert_eq!(
            StreetAddress::parse("1 A"),
            Err(FieldError::TooShort { min: 5 })
        );
        assert!(StreetAddress::parse("123 Main St").is_ok());
    }

    #[test]
    fn test_password_policy_and_redaction() {
        assert_eq!(Password::parse("12345"), Err(FieldError::TooShort { min: 6 }));
        let password = Password::parse("hunter22").unwrap();
        assert!(!format!("{password:?}").contains("hunter22"));
    }

    #[test]
    fn test_coordinates_range() {
        assert!(Coordinates::new(-33.9, 18.4).is_ok());
        assert_eq!(Coordinates::new(91.0, 0.0).unwrap_err().0, "latitude");
        assert_eq!(Coordinates::new(0.0, 181.0).unwrap_err().0, "longitude");
        assert_eq!(Coordinates::new(f64::NAN, 0.0).unwrap_err().0, "latitude");
    }

    #[test]
    fn test_validation_errors_keep_first_failure() {
        let mut errors = ValidationErrors::new();
        errors.add("idNumber", &FieldError::NotDigits);
        errors.add("idNumber", &FieldError::Required);
        assert_eq!(
            errors.fields().get("idNumber").map(String::as_str),
            Some("idNumber must contain only digits")
        );
    }
}
