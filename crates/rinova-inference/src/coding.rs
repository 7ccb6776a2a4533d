//! Medical code extraction over a text-generation backend.
//!
//! The model is asked for one JSON object. Whatever comes back is treated as
//! semi-trusted: fences are stripped, the object is located, and the result
//! goes through [`sanitize_extraction`] before anyone sees it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use rinova_core::{
    defaults, sanitize_extraction, Error, ExtractionMetadata, ExtractionResult, GenerationBackend,
    Result,
};

/// Instructions sent as the system message of every extraction call.
pub const SYSTEM_PROMPT: &str = r#"You are a certified medical coding expert. Extract ICD-10-CM, CPT, HCPCS Level II codes and CPT modifiers from the clinical note you are given.

Guidelines:
1. Only code what is documented. Start with the chief complaint, diagnosed conditions, procedures and ordered tests.
2. Mark the chief complaint or principal diagnosis as primary. A brief note may have a single code.
3. Match the E&M level to the documented history, exam and medical decision-making (MDM).
4. For every code quote the supporting text verbatim in evidence.direct_quotes, explain the choice in evidence.reasoning and list the coding guidelines applied.
5. Confidence: above 0.9 for clear, specific documentation; 0.7 to 0.9 for some supporting information; below 0.7 for minimal or unclear context.
6. When documentation would support a different procedure code, list it in alternative_cpts with what is missing.
7. Report documentation gaps that limit coding specificity.
8. Classify the note type (for example brief, soap, progress, consult, procedure, discharge).

Return only a JSON object of this shape:
{
  "note_type": "brief",
  "icd10_codes": [{"code": "", "description": "", "confidence": 0.0, "primary": false,
                   "evidence": {"direct_quotes": [], "reasoning": "", "guidelines_applied": []},
                   "suggestions": []}],
  "cpt_codes": [{"code": "", "description": "", "confidence": 0.0,
                 "evidence": {"direct_quotes": [], "reasoning": "", "guidelines_applied": []},
                 "alternative_codes": [], "suggestions": []}],
  "alternative_cpts": [{"code": "", "description": "", "confidence": 0.0,
                        "justification": "", "missing_documentation": []}],
  "hcpcs_codes": [{"code": "", "description": "", "confidence": 0.0, "suggestions": []}],
  "modifiers": [{"modifier": "", "description": "", "confidence": 0.0, "suggestions": []}],
  "documentation_gaps": [{"severity": "minor", "description": "",
                          "impact": {"affected_codes": [], "current_limitation": "", "potential_improvement": ""},
                          "recommendation": {"what_to_add": "", "example": "", "rationale": ""}}]
}"#;

/// Wrap the note text into the user message.
pub fn extraction_prompt(text: &str) -> String {
    format!("Extract codes from this clinical note:\n\n{text}")
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json", "JSON", ...) on the opening line
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse a model reply into a JSON object.
///
/// Accepts a bare object, a fenced object, or an object surrounded by prose.
/// Anything else is [`Error::InvalidFormat`].
pub fn parse_model_json(raw: &str) -> Result<Value> {
    let cleaned = strip_code_fence(raw);
    if cleaned.is_empty() {
        return Err(Error::InvalidFormat("model returned an empty reply".into()));
    }

    let direct_err = match serde_json::from_str::<Value>(cleaned) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
                return Ok(v);
            }
        }
    }

    Err(Error::InvalidFormat(format!(
        "model reply is not JSON: {direct_err}"
    )))
}

/// Runs one extraction call with a deadline and returns a sanitized result.
#[derive(Clone)]
pub struct CodeExtractor {
    backend: Arc<dyn GenerationBackend>,
    timeout: Duration,
}

impl CodeExtractor {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(defaults::EXTRACTION_TIMEOUT_SECS),
        }
    }

    /// Set the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Extract codes from `text`.
    ///
    /// Fails with [`Error::Timeout`] past the deadline, [`Error::InvalidFormat`]
    /// when the reply is not a JSON object, and passes backend errors through.
    pub async fn extract(&self, text: &str) -> Result<ExtractionResult> {
        let start = Instant::now();
        let note_length = text.chars().count();
        let prompt = extraction_prompt(text);

        let reply = tokio::time::timeout(
            self.timeout,
            self.backend.generate_with_system(SYSTEM_PROMPT, &prompt),
        )
        .await
        .map_err(|_| {
            warn!(
                subsystem = "inference",
                component = "coding",
                op = "extract",
                model = %self.backend.model_name(),
                note_len = note_length,
                timeout_secs = self.timeout.as_secs(),
                "Extraction timed out"
            );
            Error::Timeout(self.timeout.as_secs())
        })??;

        let raw = parse_model_json(&reply).map_err(|e| {
            warn!(
                subsystem = "inference",
                component = "coding",
                op = "extract",
                response_len = reply.len(),
                error = %e,
                "Unparseable model reply"
            );
            e
        })?;

        let mut result = sanitize_extraction(&raw)?;
        let processing_time_ms = start.elapsed().as_millis() as u64;
        result.metadata = ExtractionMetadata {
            model_version: defaults::EXTRACTION_MODEL_VERSION.to_string(),
            processing_time_ms,
            timestamp: Utc::now(),
            note_length,
        };

        info!(
            subsystem = "inference",
            component = "coding",
            op = "extract",
            model = %self.backend.model_name(),
            note_len = note_length,
            icd10_count = result.icd10_codes.len(),
            cpt_count = result.cpt_codes.len(),
            hcpcs_count = result.hcpcs_codes.len(),
            duration_ms = processing_time_ms,
            "Extraction complete"
        );
        debug!(note_type = %result.note_type, "Extraction note type");
        Ok(result)
    }
}
