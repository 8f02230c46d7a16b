//! Core types for Customer Manager.
//!
//! This module provides type-safe wrappers for the domain concepts.

pub mod customer;
pub mod email;
pub mod fields;
pub mod geo;
pub mod id;
pub mod user;

pub use customer::{Customer, CustomerChanges, CustomerDraft, CustomerPatch, NewCustomer};
pub use email::{Email, EmailError};
pub use fields::{
    Coordinates, DisplayName, FieldError, IdNumber, Password, PersonName, Phone, StreetAddress,
    ValidationErrors,
};
pub use geo::AddressSuggestion;
pub use id::*;
pub use user::{Role, SessionUser, UnknownRole, UserProfile};
