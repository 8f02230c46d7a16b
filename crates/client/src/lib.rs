//! Customer Manager client library.
//!
//! - [`ApiClient`] - typed calls against the REST API
//! - [`AuthSession`] - the current identity, observable through a watch channel
//! - [`SearchPipeline`] - debounced, last-writer-wins query resolution
//! - [`AddressAutocomplete`] and [`CustomerSearch`] - the two pipelines the
//!   customer form and list are built from
//! - [`CustomerClient`] - owner-scoped customer CRUD gated on the session

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod autocomplete;
pub mod config;
pub mod customers;
pub mod debounce;
pub mod error;
pub mod session;

pub use api::ApiClient;
pub use autocomplete::{AUTOCOMPLETE_DEBOUNCE, AddressAutocomplete, GeoFields, set_geo_fields};
pub use config::ClientConfig;
pub use customers::{CUSTOMER_SEARCH_DEBOUNCE, CustomerClient, CustomerSearch};
pub use debounce::{Resolver, SearchPipeline, SearchState};
pub use error::ClientError;
pub use session::{AuthSession, SessionState};
