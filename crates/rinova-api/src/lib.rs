//! # rinova-api
//!
//! HTTP surface of the Rinova medical coding service.
//!
//! The router is built from an [`AppState`] holding trait objects, so the
//! binary wires it to PostgreSQL and the OpenAI-compatible backend while
//! tests wire it to the in-memory store and the mock backend.

pub mod config;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod query_types;
pub mod router;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ErrorDetail, ErrorEnvelope};
pub use router::build_router;
pub use state::{AppState, GlobalRateLimiter};
