//! MedLens backend access: REST client, typed routes and wire types.
mod client;
mod endpoints;
pub mod error;
pub mod types;

pub use client::{RequestOptions, RestClient};
pub use endpoints::MedLensApi;
pub use error::{friendly_login_error, safe_login_error, ApiError, ApiErrorKind};
