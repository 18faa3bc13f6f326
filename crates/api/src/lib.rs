// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Atelier API Library
//!
//! HTTP surface for the Atelier billing subsystem: checkout, upgrade,
//! portal, billing info, and the Stripe webhook sink.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
