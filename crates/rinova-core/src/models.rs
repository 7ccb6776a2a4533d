//! Core data models for Rinova.
//!
//! These types are shared across all Rinova crates and represent the core
//! domain entities: submitted notes, their embedded extraction results, and
//! the aggregate views computed over them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::Error;

// =============================================================================
// NOTE TYPES
// =============================================================================

/// Processing status of a medical note.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl NoteStatus {
    pub const ALL: [NoteStatus; 4] = [
        NoteStatus::Pending,
        NoteStatus::InProgress,
        NoteStatus::Completed,
        NoteStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::Pending => "pending",
            NoteStatus::InProgress => "in_progress",
            NoteStatus::Completed => "completed",
            NoteStatus::Failed => "failed",
        }
    }

    /// Allowed lifecycle edges: `pending → in_progress → {completed, failed}`
    /// and `failed → pending` for requeue.
    pub fn can_transition_to(self, next: NoteStatus) -> bool {
        matches!(
            (self, next),
            (NoteStatus::Pending, NoteStatus::InProgress)
                | (NoteStatus::InProgress, NoteStatus::Completed)
                | (NoteStatus::InProgress, NoteStatus::Failed)
                | (NoteStatus::Failed, NoteStatus::Pending)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NoteStatus::Completed | NoteStatus::Failed)
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NoteStatus::Pending),
            "in_progress" => Ok(NoteStatus::InProgress),
            "completed" => Ok(NoteStatus::Completed),
            "failed" => Ok(NoteStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown note status '{other}'"))),
        }
    }
}

/// A submitted clinical note and its extraction lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MedicalNote {
    pub id: Uuid,
    pub text: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    /// Character count of `text`.
    pub length: i32,
    pub status: NoteStatus,
    pub extraction_attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub extraction: Option<ExtractionResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicalNote {
    /// Seconds between creation and the last update.
    pub fn turnaround_secs(&self) -> f64 {
        (self.updated_at - self.created_at).num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// Request to store a new note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNote {
    pub text: String,
    pub source: String,
    pub patient_id: Option<String>,
}

impl NewNote {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: defaults::NOTE_SOURCE.to_string(),
            patient_id: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_patient_id(mut self, patient_id: Option<String>) -> Self {
        self.patient_id = patient_id;
        self
    }

    /// Character count, matching what the store records in `length`.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

// =============================================================================
// EXTRACTION RESULT
// =============================================================================

/// Supporting material the model cited for a code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Evidence {
    pub direct_quotes: Vec<String>,
    pub reasoning: String,
    pub guidelines_applied: Vec<String>,
}

impl Evidence {
    pub fn has_quotes(&self) -> bool {
        !self.direct_quotes.is_empty()
    }
}

/// ICD-10 diagnosis code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ICD10Code {
    pub code: String,
    pub description: String,
    /// Clamped to [0, 1].
    pub confidence: f64,
    pub primary: bool,
    pub evidence: Evidence,
    pub suggestions: Vec<String>,
}

/// Lower-confidence procedure candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AlternativeCode {
    pub code: String,
    pub description: String,
    pub confidence: f64,
    pub justification: String,
    pub missing_documentation: Vec<String>,
}

/// CPT procedure code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CPTCode {
    pub code: String,
    pub description: String,
    pub confidence: f64,
    pub evidence: Evidence,
    pub alternative_codes: Vec<AlternativeCode>,
    pub suggestions: Vec<String>,
}

/// HCPCS supply/service code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HCPCSCode {
    pub code: String,
    pub description: String,
    pub confidence: f64,
    pub suggestions: Vec<String>,
}

/// Procedure modifier (e.g. `25`, `59`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Modifier {
    pub modifier: String,
    pub description: String,
    pub confidence: f64,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GapImpact {
    pub affected_codes: Vec<String>,
    pub current_limitation: String,
    pub potential_improvement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GapRecommendation {
    pub what_to_add: String,
    pub example: String,
    pub rationale: String,
}

/// Missing documentation that limits coding specificity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DocumentationGap {
    pub severity: String,
    pub description: String,
    pub impact: GapImpact,
    pub recommendation: GapRecommendation,
}

/// Bookkeeping attached to each extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ExtractionMetadata {
    pub model_version: String,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub note_length: usize,
}

/// Canonical, sanitized output of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ExtractionResult {
    pub schema_version: u32,
    /// Lower-cased free text; defaults to `brief`.
    pub note_type: String,
    pub icd10_codes: Vec<ICD10Code>,
    pub cpt_codes: Vec<CPTCode>,
    pub alternative_cpts: Vec<AlternativeCode>,
    pub hcpcs_codes: Vec<HCPCSCode>,
    pub modifiers: Vec<Modifier>,
    pub documentation_gaps: Vec<DocumentationGap>,
    pub metadata: ExtractionMetadata,
}

impl Default for ExtractionResult {
    fn default() -> Self {
        Self {
            schema_version: defaults::EXTRACTION_SCHEMA_VERSION,
            note_type: defaults::DEFAULT_NOTE_TYPE.to_string(),
            icd10_codes: Vec::new(),
            cpt_codes: Vec::new(),
            alternative_cpts: Vec::new(),
            hcpcs_codes: Vec::new(),
            modifiers: Vec::new(),
            documentation_gaps: Vec::new(),
            metadata: ExtractionMetadata::default(),
        }
    }
}

impl ExtractionResult {
    /// Confidences of every ICD-10, CPT and HCPCS code.
    pub fn code_confidences(&self) -> impl Iterator<Item = f64> + '_ {
        self.icd10_codes
            .iter()
            .map(|c| c.confidence)
            .chain(self.cpt_codes.iter().map(|c| c.confidence))
            .chain(self.hcpcs_codes.iter().map(|c| c.confidence))
    }

    pub fn code_count(&self) -> usize {
        self.icd10_codes.len() + self.cpt_codes.len() + self.hcpcs_codes.len()
    }

    /// Mean confidence over all codes, 0 when there are none.
    pub fn average_confidence(&self) -> f64 {
        let count = self.code_count();
        if count == 0 {
            return 0.0;
        }
        self.code_confidences().sum::<f64>() / count as f64
    }

    /// Whether any code carries a supporting quote.
    pub fn has_any_evidence(&self) -> bool {
        self.icd10_codes.iter().any(|c| c.evidence.has_quotes())
            || self.cpt_codes.iter().any(|c| c.evidence.has_quotes())
    }

    /// Whether every evidence-bearing code carries at least one quote.
    /// Vacuously false when there are no such codes.
    pub fn all_codes_have_evidence(&self) -> bool {
        let total = self.icd10_codes.len() + self.cpt_codes.len();
        total > 0
            && self.icd10_codes.iter().all(|c| c.evidence.has_quotes())
            && self.cpt_codes.iter().all(|c| c.evidence.has_quotes())
    }
}

/// Code family used by frequency reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CodeCategory {
    Icd10,
    Cpt,
    Hcpcs,
}

impl CodeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeCategory::Icd10 => "icd10",
            CodeCategory::Cpt => "cpt",
            CodeCategory::Hcpcs => "hcpcs",
        }
    }

    /// JSON key holding this category inside an extraction document.
    pub fn field(&self) -> &'static str {
        match self {
            CodeCategory::Icd10 => "icd10_codes",
            CodeCategory::Cpt => "cpt_codes",
            CodeCategory::Hcpcs => "hcpcs_codes",
        }
    }
}

// =============================================================================
// LISTING
// =============================================================================

/// Column used to order note listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoteSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Length,
}

impl NoteSortField {
    pub fn column(&self) -> &'static str {
        match self {
            NoteSortField::CreatedAt => "created_at",
            NoteSortField::UpdatedAt => "updated_at",
            NoteSortField::Length => "length",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Paged, filtered listing request.
#[derive(Debug, Clone, Default)]
pub struct ListNotesRequest {
    pub filter: crate::filter::NoteFilter,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort_by: NoteSortField,
    pub sort_order: SortOrder,
}

impl ListNotesRequest {
    /// Page size clamped to `1..=PAGE_LIMIT_MAX`.
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(defaults::PAGE_LIMIT)
            .clamp(1, defaults::PAGE_LIMIT_MAX)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(defaults::PAGE_OFFSET).max(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ListNotesResponse {
    pub notes: Vec<MedicalNote>,
    pub total: i64,
}

// =============================================================================
// ANALYTICS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CodeFrequency {
    pub code: String,
    pub category: CodeCategory,
    pub description: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: i64,
}

/// Documentation quality sub-scores, each a percentage in [0, 100].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QualityScores {
    pub completeness: f64,
    pub accuracy: f64,
    pub timeliness: f64,
}

/// Aggregate view over a filtered set of notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DashboardStats {
    pub total_notes: i64,
    pub status_counts: BTreeMap<String, i64>,
    pub status_percentages: BTreeMap<String, f64>,
    pub note_type_counts: BTreeMap<String, i64>,
    /// Completed over terminal notes, percentage.
    pub success_rate: f64,
    pub avg_processing_time_ms: f64,
    pub top_codes: Vec<CodeFrequency>,
    pub daily_counts: Vec<DailyCount>,
    /// Mean over completed notes; the Postgres store scores at most the
    /// 10,000 most recent.
    pub quality: QualityScores,
}

/// Dashboard request parameters.
#[derive(Debug, Clone)]
pub struct DashboardRequest {
    pub filter: crate::filter::NoteFilter,
    /// Look-back window applied on top of the filter's own date range.
    pub days: i64,
    pub top_codes: i64,
}

impl Default for DashboardRequest {
    fn default() -> Self {
        Self {
            filter: Default::default(),
            days: defaults::DASHBOARD_DAYS,
            top_codes: defaults::TOP_CODES_LIMIT,
        }
    }
}

/// Collection-wide counters for the admin surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SystemStats {
    pub total_notes: i64,
    pub notes_last_24h: i64,
    pub notes_last_7d: i64,
    pub status_counts: BTreeMap<String, i64>,
}

/// Size of the note store after maintenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct StorageStats {
    pub total_notes: i64,
    /// Indexes on the note table.
    pub indexes: i64,
    /// Table size including indexes and TOAST, in megabytes.
    pub size_mb: f64,
}

/// Queue depth for one status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QueueStatusEntry {
    pub status: NoteStatus,
    pub count: i64,
    /// Mean minutes since creation of notes in this status.
    pub avg_wait_minutes: f64,
}

/// Window for performance metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum Timeframe {
    #[serde(rename = "24h")]
    #[default]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl Timeframe {
    pub fn hours(&self) -> i64 {
        match self {
            Timeframe::Day => 24,
            Timeframe::Week => 24 * 7,
            Timeframe::Month => 24 * 30,
        }
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "24h" => Ok(Timeframe::Day),
            "7d" => Ok(Timeframe::Week),
            "30d" => Ok(Timeframe::Month),
            other => Err(Error::InvalidInput(format!(
                "timeframe must be one of 24h, 7d, 30d (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PerformanceMetrics {
    pub timeframe: Timeframe,
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub success_rate: f64,
    pub avg_processing_time_ms: f64,
    pub max_processing_time_ms: f64,
    pub avg_attempts: f64,
}

/// Result of a maintenance statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MaintenanceOutcome {
    pub affected: u64,
}
