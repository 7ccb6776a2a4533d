//! Structured logging schema and field name constants for Rinova.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied (dropped entries) |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → pipeline → sub-calls.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "inference", "jobs", "core"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "sanitize", "openai", "pool", "worker", "pipeline"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "extract", "claim", "dashboard", "cleanup"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Note UUID being operated on.
pub const NOTE_ID: &str = "note_id";

/// Note status after a transition.
pub const STATUS: &str = "status";

/// Sanitized search text.
pub const QUERY: &str = "query";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows returned by a query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of texts in a batch request.
pub const BATCH_SIZE: &str = "batch_size";

/// Character length of the submitted note.
pub const NOTE_LEN: &str = "note_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Extraction fields ─────────────────────────────────────────────────────

/// ICD-10 codes kept after sanitization.
pub const ICD10_COUNT: &str = "icd10_count";

/// CPT codes kept after sanitization.
pub const CPT_COUNT: &str = "cpt_count";

/// HCPCS codes kept after sanitization.
pub const HCPCS_COUNT: &str = "hcpcs_count";

/// Entries dropped during sanitization.
pub const DROPPED_COUNT: &str = "dropped_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Rows touched by a maintenance statement.
pub const ROWS_AFFECTED: &str = "rows_affected";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
