//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Password sign-up/sign-in, bearer tokens, password reset
//! - `customers` - Owner-scoped customer records
//! - `email` - Transactional email over SMTP

pub mod auth;
pub mod customers;
pub mod email;

pub use auth::{AuthError, AuthService, Claims, IssuedToken, PasswordResetTicket, TokenIssuer};
pub use customers::{CustomerError, CustomerService};
pub use email::{EmailService, MailError};
