//! Core traits for storage and inference abstractions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

/// Repository for medical notes and their extraction lifecycle.
///
/// Status changes are compare-and-set: each transition only applies when the
/// note is in the expected source status, otherwise it fails with
/// `Error::Conflict`. Two concurrent extractions of one note therefore cannot
/// both run.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Store a new note with status `pending`.
    async fn insert(&self, note: NewNote) -> Result<MedicalNote>;

    /// Fetch a note by ID.
    async fn fetch(&self, id: Uuid) -> Result<MedicalNote>;

    /// List notes matching a filter, paged and sorted.
    async fn list(&self, req: ListNotesRequest) -> Result<ListNotesResponse>;

    /// Claim a pending note: `pending → in_progress`, bumping the attempt counter.
    async fn begin_extraction(&self, id: Uuid) -> Result<MedicalNote>;

    /// Store the result: `in_progress → completed`.
    async fn complete_extraction(&self, id: Uuid, result: &ExtractionResult) -> Result<()>;

    /// Record a failure: `in_progress → failed`.
    async fn fail_extraction(&self, id: Uuid, error: &str) -> Result<()>;

    /// Put one failed note back in the queue: `failed → pending`.
    async fn requeue(&self, id: Uuid) -> Result<MedicalNote>;

    /// Requeue up to `limit` failed notes that have fewer than `max_attempts` attempts.
    async fn requeue_failed(&self, limit: i64, max_attempts: i32) -> Result<u64>;

    /// Claim up to `limit` requeued notes for the background worker.
    ///
    /// Only pending notes that have been attempted before are eligible; fresh
    /// submissions are owned by the request that created them.
    async fn claim_requeued(&self, limit: i64) -> Result<Vec<MedicalNote>>;

    /// Fail in-progress notes whose last attempt started before `cutoff`.
    async fn fail_abandoned(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete failed and pending notes created before `cutoff`.
    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Rebuild indexes and planner statistics, then report the store's size.
    async fn optimize(&self) -> Result<StorageStats>;

    /// Check that the store is reachable.
    async fn health_check(&self) -> Result<bool>;
}

/// Read-only aggregate views over the note collection.
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Dashboard statistics for a filter and look-back window.
    async fn dashboard(&self, req: DashboardRequest) -> Result<DashboardStats>;

    /// Collection-wide counters.
    async fn system_stats(&self) -> Result<SystemStats>;

    /// Count and mean wait per status.
    async fn queue_status(&self) -> Result<Vec<QueueStatusEntry>>;

    /// Processing metrics over a recent window.
    async fn performance_metrics(&self, timeframe: Timeframe) -> Result<PerformanceMetrics>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Generation backend that can report its own availability.
#[async_trait]
pub trait InferenceBackend: GenerationBackend {
    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;
}
