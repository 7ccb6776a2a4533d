//! Mock generation backend for deterministic testing.
//!
//! ```rust,ignore
//! use rinova_inference::mock::MockGenerationBackend;
//!
//! let backend = MockGenerationBackend::new()
//!     .with_fixed_response(r#"{"icd10_codes": []}"#)
//!     .with_latency_for("slow note", 45_000)
//!     .failing_on("broken note");
//! assert_eq!(backend.generate_call_count(), 0);
//! ```
//!
//! Rules keyed by text match when the prompt contains that text, so a rule
//! written against a note body still fires after the note is wrapped into
//! the extraction prompt.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use rinova_core::{Error, GenerationBackend, InferenceBackend, Result};

/// Mock backend for testing.
#[derive(Clone)]
pub struct MockGenerationBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    model: String,
    default_response: String,
    responses: Vec<(String, String)>,
    latency_ms: u64,
    latencies: Vec<(String, u64)>,
    failures: Vec<String>,
    healthy: bool,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub system: String,
    pub prompt: String,
    pub timestamp: Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            model: "mock-model".to_string(),
            default_response: r#"{"note_type": "brief", "icd10_codes": [], "cpt_codes": []}"#
                .to_string(),
            responses: Vec::new(),
            latency_ms: 0,
            latencies: Vec::new(),
            failures: Vec::new(),
            healthy: true,
        }
    }
}

impl MockGenerationBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the response returned when no mapping matches.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Return `output` for prompts containing `input`.
    pub fn with_response_mapping(
        mut self,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .responses
            .push((input.into(), output.into()));
        self
    }

    /// Set simulated latency for every call.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set simulated latency for prompts containing `input`.
    pub fn with_latency_for(mut self, input: impl Into<String>, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config)
            .latencies
            .push((input.into(), latency_ms));
        self
    }

    /// Fail with `Error::Inference` for prompts containing `input`.
    pub fn failing_on(mut self, input: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).failures.push(input.into());
        self
    }

    /// Set what `health_check` reports.
    pub fn with_health(mut self, healthy: bool) -> Self {
        Arc::make_mut(&mut self.config).healthy = healthy;
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.log().clone()
    }

    /// Get number of generation calls.
    pub fn generate_call_count(&self) -> usize {
        self.log().len()
    }

    fn log(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.call_log.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn latency_for(&self, prompt: &str) -> u64 {
        self.config
            .latencies
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, ms)| *ms)
            .unwrap_or(self.config.latency_ms)
    }

    fn response_for(&self, prompt: &str) -> String {
        self.config
            .responses
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| self.config.default_response.clone())
    }
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.log().push(MockCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
            timestamp: Instant::now(),
        });

        let latency = self.latency_for(prompt);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self
            .config
            .failures
            .iter()
            .any(|needle| prompt.contains(needle.as_str()))
        {
            return Err(Error::Inference("simulated backend failure".to_string()));
        }

        Ok(self.response_for(prompt))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl InferenceBackend for MockGenerationBackend {
    async fn health_check(&self) -> Result<bool> {
        Ok(self.config.healthy)
    }
}
