//! Customer Manager Core - Shared domain types.
//!
//! This crate provides the types shared by every Customer Manager component:
//! - `server` - REST API, identity provider and customer store
//! - `client` - Typed API client, auth session and debounced search pipelines
//! - `cli` - Migrations and a terminal front-end
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and lets the server and
//! the client agree on one definition of a valid customer record.
//!
//! # Modules
//!
//! - [`types`] - IDs, email, validated customer fields, customers, address
//!   suggestions and user identities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
