//! # rinova-core
//!
//! Core types, traits, and sanitization logic for the Rinova medical coding
//! service.
//!
//! This crate provides the domain model shared by the storage, inference,
//! pipeline and API crates, along with the pure logic that does not need I/O:
//! extraction-payload sanitization, stored-document normalization, note
//! filtering and dashboard scoring.

pub mod defaults;
pub mod error;
pub mod ext_json;
pub mod filter;
pub mod logging;
pub mod models;
pub mod quality;
pub mod sanitize;
pub mod schema;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use ext_json::unwrap_extended;
pub use filter::{sanitize_search_text, NoteFilter};
pub use models::*;
pub use quality::{accuracy_score, completeness_score, timeliness_score, QualityAccumulator};
pub use sanitize::{clamp_confidence, sanitize_extraction};
pub use schema::{normalize_extraction, normalize_status};
pub use traits::*;
