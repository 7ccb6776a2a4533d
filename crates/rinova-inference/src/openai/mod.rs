//! OpenAI-compatible inference backend.
//!
//! Works with any endpoint that speaks the chat-completions protocol,
//! including the OpenAI cloud API, Azure OpenAI, vLLM and LocalAI.
//!
//! # Example
//!
//! ```rust,no_run
//! use rinova_inference::openai::{OpenAIBackend, OpenAIConfig};
//! use rinova_core::GenerationBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     // From environment variables
//!     let backend = OpenAIBackend::from_env().unwrap();
//!
//!     // Or with custom config
//!     let config = OpenAIConfig {
//!         base_url: "http://localhost:8000/v1".to_string(),
//!         api_key: None,
//!         ..Default::default()
//!     };
//!     let backend = OpenAIBackend::new(config).unwrap();
//!
//!     let json = backend.generate("Return {\"ok\": true}").await.unwrap();
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig, DEFAULT_OPENAI_URL, DEFAULT_TIMEOUT_SECS};
pub use error::{to_rinova_error, OpenAIErrorCode};
pub use types::*;
