//! # rinova-inference
//!
//! Text-generation backends and the code extractor built on them.
//!
//! This crate provides:
//! - An OpenAI-compatible chat-completions backend (JSON mode)
//! - [`CodeExtractor`], which bounds a call with a deadline and turns the
//!   reply into a sanitized `ExtractionResult`
//! - A deterministic mock backend (feature `mock`, always on in tests)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rinova_inference::{CodeExtractor, OpenAIBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let extractor = CodeExtractor::new(Arc::new(backend));
//!     let result = extractor.extract("Pt with HTN, BP 160/95").await.unwrap();
//!     println!("{} ICD-10 codes", result.icd10_codes.len());
//! }
//! ```

pub mod coding;
pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use rinova_core::*;

pub use coding::{parse_model_json, strip_code_fence, CodeExtractor, SYSTEM_PROMPT};
pub use openai::{OpenAIBackend, OpenAIConfig};
