//! Extraction pipeline: validate, persist, claim, extract, record.
//!
//! Every submission is stored before the model is called, so a failed or
//! timed-out extraction still leaves a `failed` note behind that can be
//! requeued. The claim (`pending → in_progress`) is a compare-and-set in the
//! repository; a lost race surfaces as `Error::Conflict` and the loser does
//! not call the model.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use rinova_core::{
    defaults, Error, ExtractionResult, MedicalNote, NewNote, NoteRepository, Result,
};
use rinova_inference::CodeExtractor;

/// Limits applied by the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Longest accepted note, in characters.
    pub max_note_chars: usize,
    /// Extractions running at once inside one batch.
    pub max_concurrent: usize,
    /// Largest accepted batch.
    pub max_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_note_chars: defaults::MAX_NOTE_CHARS,
            max_concurrent: defaults::MAX_CONCURRENT_EXTRACTIONS,
            max_batch_size: defaults::MAX_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `MAX_NOTE_CHARS` | `100000` |
    /// | `MAX_CONCURRENT_EXTRACTIONS` | `10` |
    /// | `MAX_BATCH_SIZE` | `50` |
    pub fn from_env() -> Self {
        let base = Self::default();
        let read = |name: &str, fallback: usize| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(fallback)
                .max(1)
        };
        Self {
            max_note_chars: read("MAX_NOTE_CHARS", base.max_note_chars),
            max_concurrent: read("MAX_CONCURRENT_EXTRACTIONS", base.max_concurrent),
            max_batch_size: read("MAX_BATCH_SIZE", base.max_batch_size),
        }
    }

    pub fn with_max_note_chars(mut self, n: usize) -> Self {
        self.max_note_chars = n;
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    pub fn with_max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = n;
        self
    }
}

/// Result of one extraction attempt.
///
/// `note_id` is set whenever the note was stored, including when the
/// extraction itself failed afterwards.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub note_id: Option<Uuid>,
    pub result: Result<ExtractionResult>,
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    fn rejected(error: Error) -> Self {
        Self {
            note_id: None,
            result: Err(error),
        }
    }
}

/// Drives notes through storage and extraction.
pub struct ExtractionPipeline {
    notes: Arc<dyn NoteRepository>,
    extractor: CodeExtractor,
    config: PipelineConfig,
}

impl ExtractionPipeline {
    pub fn new(notes: Arc<dyn NoteRepository>, extractor: CodeExtractor) -> Self {
        Self {
            notes,
            extractor,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn extractor(&self) -> &CodeExtractor {
        &self.extractor
    }

    /// Reject notes outside `MIN_NOTE_CHARS..=max_note_chars`.
    pub fn validate(&self, text: &str) -> Result<()> {
        let len = text.chars().count();
        if len < defaults::MIN_NOTE_CHARS {
            return Err(Error::InvalidInput("text must not be empty".to_string()));
        }
        if len > self.config.max_note_chars {
            return Err(Error::InvalidInput(format!(
                "text is {len} characters, maximum is {}",
                self.config.max_note_chars
            )));
        }
        Ok(())
    }

    /// Validate, store, claim and extract one note.
    ///
    /// Validation happens before anything is stored or sent to the model.
    pub async fn extract(&self, note: NewNote) -> ExtractionOutcome {
        if let Err(e) = self.validate(&note.text) {
            debug!(
                subsystem = "jobs",
                component = "pipeline",
                op = "validate",
                error = %e,
                "Rejected note"
            );
            return ExtractionOutcome::rejected(e);
        }

        let stored = match self.notes.insert(note).await {
            Ok(n) => n,
            Err(e) => return ExtractionOutcome::rejected(e),
        };

        let claimed = match self.notes.begin_extraction(stored.id).await {
            Ok(n) => n,
            Err(e) => {
                return ExtractionOutcome {
                    note_id: Some(stored.id),
                    result: Err(e),
                }
            }
        };

        self.process_claimed(&claimed).await
    }

    /// Shorthand for [`extract`](Self::extract) with default source.
    pub async fn extract_text(&self, text: impl Into<String>) -> ExtractionOutcome {
        self.extract(NewNote::new(text)).await
    }

    /// Extract every note concurrently, bounded by `max_concurrent`.
    ///
    /// Outcomes come back in input order. A failing item never affects the
    /// others.
    pub async fn extract_batch(&self, notes: Vec<NewNote>) -> Result<Vec<ExtractionOutcome>> {
        if notes.len() > self.config.max_batch_size {
            return Err(Error::InvalidInput(format!(
                "batch has {} texts, maximum is {}",
                notes.len(),
                self.config.max_batch_size
            )));
        }

        let start = Instant::now();
        let batch_size = notes.len();
        let outcomes: Vec<ExtractionOutcome> = stream::iter(notes)
            .map(|note| self.extract(note))
            .buffered(self.config.max_concurrent)
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            subsystem = "jobs",
            component = "pipeline",
            op = "extract_batch",
            batch_size,
            succeeded,
            failed = batch_size - succeeded,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch extraction finished"
        );
        Ok(outcomes)
    }

    /// Run extraction for a note that is already `in_progress`.
    ///
    /// Records the result or the failure on the note. When recording fails
    /// the outcome carries the storage error, never the extraction result.
    pub async fn process_claimed(&self, note: &MedicalNote) -> ExtractionOutcome {
        let start = Instant::now();
        let extracted = self.extractor.extract(&note.text).await;

        let recorded = match &extracted {
            Ok(extraction) => self.notes.complete_extraction(note.id, extraction).await,
            Err(e) => self.notes.fail_extraction(note.id, &e.to_string()).await,
        };
        if let Err(e) = &recorded {
            error!(
                subsystem = "jobs",
                component = "pipeline",
                note_id = %note.id,
                error = %e,
                "Could not record extraction outcome"
            );
        }
        let result = recorded.and(extracted);

        match &result {
            Ok(_) => debug!(
                subsystem = "jobs",
                component = "pipeline",
                op = "process",
                note_id = %note.id,
                attempt = note.extraction_attempts,
                duration_ms = start.elapsed().as_millis() as u64,
                "Note extracted"
            ),
            Err(e) => warn!(
                subsystem = "jobs",
                component = "pipeline",
                op = "process",
                note_id = %note.id,
                attempt = note.extraction_attempts,
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "Note extraction failed"
            ),
        }

        ExtractionOutcome {
            note_id: Some(note.id),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rinova_core::NoteStatus;
    use rinova_db::MemoryNoteRepository;
    use rinova_inference::mock::MockGenerationBackend;
    use std::time::Duration;

    const E11_9: &str = r#"{"icd10_codes":[{"code":"E11.9","confidence":1.5}],"cpt_codes":[{"code":"","confidence":0.9}]}"#;

    fn pipeline_with(backend: MockGenerationBackend) -> (Arc<MemoryNoteRepository>, ExtractionPipeline) {
        let repo = Arc::new(MemoryNoteRepository::new());
        let extractor = CodeExtractor::new(Arc::new(backend)).with_timeout(Duration::from_secs(30));
        let pipeline = ExtractionPipeline::new(repo.clone(), extractor);
        (repo, pipeline)
    }

    #[tokio::test]
    async fn test_successful_extraction_completes_note() {
        let (repo, pipeline) = pipeline_with(MockGenerationBackend::new().with_fixed_response(E11_9));

        let outcome = pipeline.extract_text("Pt with DM2").await;
        let result = outcome.result.as_ref().unwrap();
        assert_eq!(result.icd10_codes.len(), 1);
        assert_eq!(result.icd10_codes[0].confidence, 1.0);
        assert!(result.cpt_codes.is_empty());

        let note = repo.fetch(outcome.note_id.unwrap()).await.unwrap();
        assert_eq!(note.status, NoteStatus::Completed);
        assert_eq!(note.extraction_attempts, 1);
        assert_eq!(note.extraction.unwrap().icd10_codes[0].code, "E11.9");
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_extraction() {
        let backend = MockGenerationBackend::new();
        let (repo, pipeline) = pipeline_with(backend.clone());

        let outcome = pipeline.extract_text("").await;
        assert!(matches!(outcome.result, Err(Error::InvalidInput(_))));
        assert!(outcome.note_id.is_none());
        assert_eq!(backend.generate_call_count(), 0);
        assert!(repo.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_text_rejected() {
        let (_, pipeline) = pipeline_with(MockGenerationBackend::new());
        let pipeline = pipeline.with_config(PipelineConfig::default().with_max_note_chars(5));
        assert!(pipeline.validate("12345").is_ok());
        let outcome = pipeline.extract_text("123456").await;
        assert!(matches!(outcome.result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_failed_extraction_marks_note_failed() {
        let (repo, pipeline) =
            pipeline_with(MockGenerationBackend::new().with_fixed_response("not json"));

        let outcome = pipeline.extract_text("Pt with cough").await;
        assert!(matches!(outcome.result, Err(Error::InvalidFormat(_))));

        let note = repo.fetch(outcome.note_id.unwrap()).await.unwrap();
        assert_eq!(note.status, NoteStatus::Failed);
        assert!(note.last_error.unwrap().contains("Invalid format"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_with_timed_out_item_is_partial() {
        let backend = MockGenerationBackend::new()
            .with_fixed_response(E11_9)
            .with_latency_for("second", 60_000);
        let (repo, pipeline) = pipeline_with(backend);

        let outcomes = pipeline
            .extract_batch(vec![
                NewNote::new("first note"),
                NewNote::new("second note"),
                NewNote::new("third note"),
            ])
            .await
            .unwrap();

        let flags: Vec<bool> = outcomes.iter().map(|o| o.is_success()).collect();
        assert_eq!(flags, vec![true, false, true]);
        assert!(matches!(outcomes[1].result, Err(Error::Timeout(30))));

        let timed_out = repo.fetch(outcomes[1].note_id.unwrap()).await.unwrap();
        assert_eq!(timed_out.status, NoteStatus::Failed);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_isolates_invalid_items() {
        let backend = MockGenerationBackend::new()
            .with_response_mapping("alpha", r#"{"note_type":"alpha"}"#)
            .with_response_mapping("gamma", r#"{"note_type":"gamma"}"#);
        let (_, pipeline) = pipeline_with(backend);
        let pipeline = pipeline.with_config(PipelineConfig::default().with_max_concurrent(2));

        let outcomes = pipeline
            .extract_batch(vec![NewNote::new("alpha"), NewNote::new(""), NewNote::new("gamma")])
            .await
            .unwrap();

        assert_eq!(outcomes[0].result.as_ref().unwrap().note_type, "alpha");
        assert!(matches!(outcomes[1].result, Err(Error::InvalidInput(_))));
        assert_eq!(outcomes[2].result.as_ref().unwrap().note_type, "gamma");
    }

    #[tokio::test]
    async fn test_batch_over_limit_is_rejected_whole() {
        let (_, pipeline) = pipeline_with(MockGenerationBackend::new());
        let pipeline = pipeline.with_config(PipelineConfig::default().with_max_batch_size(2));
        let err = pipeline
            .extract_batch(vec![NewNote::new("a"), NewNote::new("b"), NewNote::new("c")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_is_empty() {
        let (_, pipeline) = pipeline_with(MockGenerationBackend::new());
        assert!(pipeline.extract_batch(vec![]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_reported_without_note_id() {
        let backend = MockGenerationBackend::new();
        let (repo, pipeline) = pipeline_with(backend.clone());
        repo.set_unavailable(true);

        let outcome = pipeline.extract_text("anything").await;
        assert!(matches!(outcome.result, Err(Error::Database(_))));
        assert!(outcome.note_id.is_none());
        assert_eq!(backend.generate_call_count(), 0);
    }

    #[tokio::test]
    async fn test_unrecorded_success_is_reported_as_failure() {
        let (repo, pipeline) = pipeline_with(MockGenerationBackend::new().with_fixed_response(E11_9));
        repo.set_outcome_writes_failing(true);

        let outcome = pipeline.extract_text("Pt with DM2").await;
        assert!(matches!(outcome.result, Err(Error::Database(_))));
        assert!(!outcome.is_success());

        let note = repo.fetch(outcome.note_id.unwrap()).await.unwrap();
        assert_eq!(note.status, NoteStatus::InProgress);
        assert!(note.extraction.is_none());
    }

    #[tokio::test]
    async fn test_unrecorded_failure_reports_storage_error() {
        let (repo, pipeline) =
            pipeline_with(MockGenerationBackend::new().with_fixed_response("not json"));
        repo.set_outcome_writes_failing(true);

        let outcome = pipeline.extract_text("Pt with cough").await;
        assert!(matches!(outcome.result, Err(Error::Database(_))));
    }
}
