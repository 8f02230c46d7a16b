//! Customer records and the inputs that create and edit them.
//!
//! Raw form input arrives as a [`CustomerDraft`] or [`CustomerPatch`] of plain
//! strings. `validate` turns them into [`NewCustomer`] / [`CustomerChanges`],
//! whose fields are the checked newtypes from [`super::fields`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::fields::{
    Coordinates, FieldError, IdNumber, PersonName, Phone, StreetAddress, ValidationErrors,
};
use super::id::{CustomerId, UserId};

const FORMATTED_ADDRESS_MAX: usize = 500;

/// A stored customer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Store-assigned id.
    pub id: CustomerId,
    /// National identity number.
    pub id_number: IdNumber,
    /// Given name.
    pub first_name: PersonName,
    /// Family name.
    pub last_name: PersonName,
    /// Contact email.
    pub email: Email,
    /// Contact phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<Phone>,
    /// Address as typed.
    pub address: StreetAddress,
    /// Provider-formatted address from geocoding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    /// Geocoded latitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Geocoded longitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Owning identity. Never changes after creation.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Case-insensitive substring match over first name, last name, email,
    /// address and id number. A blank term matches everything.
    #[must_use]
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        [
            self.first_name.as_str(),
            self.last_name.as_str(),
            self.email.as_str(),
            self.address.as_str(),
            self.id_number.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&term))
    }

    /// Apply validated changes and bump `updated_at`.
    ///
    /// `id`, `created_by` and `created_at` are never touched.
    pub fn apply(&mut self, changes: CustomerChanges, now: DateTime<Utc>) {
        let CustomerChanges {
            id_number,
            first_name,
            last_name,
            email,
            phone,
            address,
            formatted_address,
            latitude,
            longitude,
        } = changes;

        if let Some(v) = id_number {
            self.id_number = v;
        }
        if let Some(v) = first_name {
            self.first_name = v;
        }
        if let Some(v) = last_name {
            self.last_name = v;
        }
        if let Some(v) = email {
            self.email = v;
        }
        if let Some(v) = phone {
            self.phone = v;
        }
        if let Some(v) = address {
            self.address = v;
        }
        if let Some(v) = formatted_address {
            self.formatted_address = v;
        }
        if let Some(v) = latitude {
            self.latitude = v;
        }
        if let Some(v) = longitude {
            self.longitude = v;
        }
        self.updated_at = now;
    }

    /// Full name for display.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Unvalidated input for creating a customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDraft {
    #[serde(default)]
    pub id_number: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl CustomerDraft {
    /// Check every field, collecting all failures.
    ///
    /// # Errors
    ///
    /// Returns the per-field failures if any field is invalid.
    pub fn validate(&self) -> Result<NewCustomer, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let id_number = errors.check("idNumber", IdNumber::parse(&self.id_number));
        let first_name = errors.check("firstName", PersonName::parse(&self.first_name));
        let last_name = errors.check("lastName", PersonName::parse(&self.last_name));
        let email = errors.check(
            "email",
            Email::parse_as_entered(&self.email).map_err(FieldError::from),
        );
        let phone = errors.check("phone", Phone::parse_optional(self.phone.as_deref()));
        let address = errors.check("address", StreetAddress::parse(&self.address));
        let formatted_address = errors.check(
            "formattedAddress",
            optional_text(self.formatted_address.as_deref(), FORMATTED_ADDRESS_MAX),
        );
        let latitude = errors.check(
            "latitude",
            self.latitude.map(Coordinates::latitude).transpose(),
        );
        let longitude = errors.check(
            "longitude",
            self.longitude.map(Coordinates::longitude).transpose(),
        );

        match (
            id_number,
            first_name,
            last_name,
            email,
            phone,
            address,
            formatted_address,
            latitude,
            longitude,
        ) {
            (
                Some(id_number),
                Some(first_name),
                Some(last_name),
                Some(email),
                Some(phone),
                Some(address),
                Some(formatted_address),
                Some(latitude),
                Some(longitude),
            ) if errors.is_empty() => Ok(NewCustomer {
                id_number,
                first_name,
                last_name,
                email,
                phone,
                address,
                formatted_address,
                latitude,
                longitude,
            }),
            _ => Err(errors),
        }
    }
}

/// A validated customer ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub id_number: IdNumber,
    pub first_name: PersonName,
    pub last_name: PersonName,
    pub email: Email,
    pub phone: Option<Phone>,
    pub address: StreetAddress,
    pub formatted_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl NewCustomer {
    /// Build the stored record for `owner`.
    #[must_use]
    pub fn into_customer(self, id: CustomerId, owner: UserId, now: DateTime<Utc>) -> Customer {
        Customer {
            id,
            id_number: self.id_number,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            address: self.address,
            formatted_address: self.formatted_address,
            latitude: self.latitude,
            longitude: self.longitude,
            created_by: owner,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Unvalidated partial update. Absent fields are left unchanged; an empty
/// `phone` or `formattedAddress` clears the stored value, and clearing
/// `formattedAddress` also clears any coordinates not sent alongside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl CustomerPatch {
    /// Check every provided field, collecting all failures.
    ///
    /// # Errors
    ///
    /// Returns the per-field failures if any provided field is invalid.
    pub fn validate(&self) -> Result<CustomerChanges, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let mut changes = CustomerChanges {
            id_number: self
                .id_number
                .as_deref()
                .and_then(|v| errors.check("idNumber", IdNumber::parse(v))),
            first_name: self
                .first_name
                .as_deref()
                .and_then(|v| errors.check("firstName", PersonName::parse(v))),
            last_name: self
                .last_name
                .as_deref()
                .and_then(|v| errors.check("lastName", PersonName::parse(v))),
            email: self.email.as_deref().and_then(|v| {
                errors.check(
                    "email",
                    Email::parse_as_entered(v).map_err(FieldError::from),
                )
            }),
            phone: self
                .phone
                .as_deref()
                .and_then(|v| errors.check("phone", Phone::parse_optional(Some(v)))),
            address: self
                .address
                .as_deref()
                .and_then(|v| errors.check("address", StreetAddress::parse(v))),
            formatted_address: self.formatted_address.as_deref().and_then(|v| {
                errors.check(
                    "formattedAddress",
                    optional_text(Some(v), FORMATTED_ADDRESS_MAX),
                )
            }),
            latitude: self
                .latitude
                .and_then(|v| errors.check("latitude", Coordinates::latitude(v)))
                .map(Some),
            longitude: self
                .longitude
                .and_then(|v| errors.check("longitude", Coordinates::longitude(v)))
                .map(Some),
        };

        // Coordinates belong to the formatted address; clearing it drops them.
        if changes.formatted_address == Some(None) {
            changes.latitude = changes.latitude.or(Some(None));
            changes.longitude = changes.longitude.or(Some(None));
        }

        if errors.is_empty() {
            Ok(changes)
        } else {
            Err(errors)
        }
    }
}

/// Validated partial update.
///
/// The outer `Option` is "was this field provided"; for `phone`,
/// `formatted_address` and the coordinates the inner `None` clears the
/// stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerChanges {
    pub id_number: Option<IdNumber>,
    pub first_name: Option<PersonName>,
    pub last_name: Option<PersonName>,
    pub email: Option<Email>,
    pub phone: Option<Option<Phone>>,
    pub address: Option<StreetAddress>,
    pub formatted_address: Option<Option<String>>,
    pub latitude: Option<Option<f64>>,
    pub longitude: Option<Option<f64>>,
}

impl CustomerChanges {
    /// Whether no field was provided.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn optional_text(value: Option<&str>, max: usize) -> Result<Option<String>, FieldError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => Err(FieldError::TooLong { max }),
        Some(v) => Ok(Some(v.to_owned())),
    }
}
