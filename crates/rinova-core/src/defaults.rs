//! Centralized default constants for the Rinova service.
//!
//! Every crate references these constants instead of defining its own magic
//! numbers. Environment variables in the API binary and the worker override
//! the runtime-tunable ones.

// =============================================================================
// EXTRACTION
// =============================================================================

/// Deadline for one call to the text-generation service, in seconds.
pub const EXTRACTION_TIMEOUT_SECS: u64 = 30;

/// Maximum extractions running at once within a batch request.
pub const MAX_CONCURRENT_EXTRACTIONS: usize = 10;

/// Maximum number of texts accepted by the batch endpoint.
pub const MAX_BATCH_SIZE: usize = 50;

/// Minimum characters in a submitted note.
pub const MIN_NOTE_CHARS: usize = 1;

/// Maximum characters in a submitted note.
pub const MAX_NOTE_CHARS: usize = 100_000;

/// A note stops being eligible for requeue after this many attempts.
pub const MAX_EXTRACTION_ATTEMPTS: i32 = 5;

/// Sampling temperature sent with extraction requests.
pub const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// Reported in extraction metadata.
pub const EXTRACTION_MODEL_VERSION: &str = "1.0";

/// Default chat model for the OpenAI-compatible backend.
pub const GEN_MODEL: &str = "gpt-4-turbo-preview";

/// Default source label stamped on notes submitted through the API.
pub const NOTE_SOURCE: &str = "api";

// =============================================================================
// SANITIZATION
// =============================================================================

/// Confidence assigned when a code entry has none or an unparseable one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Note type used when the model returns none.
pub const DEFAULT_NOTE_TYPE: &str = "brief";

/// Gap severity used when the model returns none.
pub const DEFAULT_GAP_SEVERITY: &str = "minor";

/// Current version of the stored extraction document.
pub const EXTRACTION_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for list and search endpoints.
pub const PAGE_LIMIT: i64 = 20;

/// Largest page size a client may request.
pub const PAGE_LIMIT_MAX: i64 = 100;

/// Default page offset.
pub const PAGE_OFFSET: i64 = 0;

/// Default number of entries in the most-frequent-codes list.
pub const TOP_CODES_LIMIT: i64 = 10;

/// Largest most-frequent-codes list a client may request.
pub const TOP_CODES_LIMIT_MAX: i64 = 50;

/// Default dashboard look-back window in days.
pub const DASHBOARD_DAYS: i64 = 30;

// =============================================================================
// MAINTENANCE
// =============================================================================

/// Default age in days before stale failed/pending notes are deleted.
pub const CLEANUP_DAYS: i64 = 30;

/// Smallest age in days cleanup will accept.
pub const CLEANUP_MIN_DAYS: i64 = 7;

/// Largest age in days cleanup will accept.
pub const CLEANUP_MAX_DAYS: i64 = 36_500;

/// Default number of failed notes requeued per reprocess call.
pub const REPROCESS_LIMIT: i64 = 100;

/// Largest number of failed notes requeued per reprocess call.
pub const REPROCESS_LIMIT_MAX: i64 = 1000;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP bind address.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 8000;

/// Default rate limit: max requests per period.
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Default rate limit: period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Health check results are reused for this many seconds.
pub const HEALTH_CACHE_TTL_SECS: u64 = 300;

/// Maximum request body size in bytes.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// WORKER
// =============================================================================

/// Interval between polls for requeued notes, in milliseconds.
pub const WORKER_POLL_INTERVAL_MS: u64 = 5_000;

/// Notes claimed per worker poll.
pub const WORKER_BATCH_SIZE: i64 = 10;

/// An `in_progress` note whose last attempt started this long ago is
/// considered abandoned and marked failed.
pub const WORKER_STALE_AFTER_SECS: u64 = 600;

/// Capacity of the worker event broadcast channel.
pub const WORKER_EVENT_CAPACITY: usize = 256;

// =============================================================================
// DATABASE
// =============================================================================

/// Maximum connections in the pool.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Minimum idle connections kept in the pool.
pub const DB_MIN_CONNECTIONS: u32 = 1;

/// Seconds to wait for a connection before giving up.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds before an idle connection is closed.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Seconds before a connection is recycled.
pub const DB_MAX_LIFETIME_SECS: u64 = 1800;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_limits_are_ordered() {
        assert!(PAGE_LIMIT > 0);
        assert!(PAGE_LIMIT <= PAGE_LIMIT_MAX);
        assert!(TOP_CODES_LIMIT <= TOP_CODES_LIMIT_MAX);
    }

    #[test]
    fn test_cleanup_default_respects_minimum() {
        assert!(CLEANUP_DAYS >= CLEANUP_MIN_DAYS);
        assert!(CLEANUP_DAYS <= CLEANUP_MAX_DAYS);
    }

    #[test]
    fn test_default_confidence_in_range() {
        assert!((0.0..=1.0).contains(&DEFAULT_CONFIDENCE));
    }
}
