//! Note filter shared by listing, search and dashboard queries.
//!
//! Every field is optional and fields combine with AND. An empty filter
//! matches every note. The database layer turns a [`NoteFilter`] into SQL;
//! [`NoteFilter::matches`] evaluates the same predicate in memory.
//!
//! # Example
//!
//! ```
//! use rinova_core::{NoteFilter, NoteStatus};
//!
//! let filter = NoteFilter::new()
//!     .with_status(NoteStatus::Completed)
//!     .with_search("chest pain; DROP TABLE");
//!
//! assert!(!filter.is_empty());
//! assert_eq!(filter.search_terms().as_deref(), Some("chest pain DROP TABLE"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MedicalNote, NoteStatus};

/// Optional, additive constraints over the note collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<NoteStatus>,
    /// Inclusive lower bound on `created_at`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
    /// Raw search text; sanitized before use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_documentation_gaps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
}

impl NoteFilter {
    /// Create an empty filter (matches all notes).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_note_type(mut self, note_type: impl Into<String>) -> Self {
        self.note_type = Some(note_type.into());
        self
    }

    pub fn with_status(mut self, status: NoteStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_documentation_gaps(mut self, has_gaps: bool) -> Self {
        self.has_documentation_gaps = Some(has_gaps);
        self
    }

    pub fn with_patient_id(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    /// Whether no constraint is active.
    ///
    /// Search text that sanitizes to nothing and a blank note type do not count.
    pub fn is_empty(&self) -> bool {
        self.normalized_note_type().is_none()
            && self.status.is_none()
            && self.created_after.is_none()
            && self.created_before.is_none()
            && self.search_terms().is_none()
            && self.has_documentation_gaps.is_none()
            && self.patient_id.is_none()
    }

    /// Lower-cased note type, `None` when blank.
    pub fn normalized_note_type(&self) -> Option<String> {
        self.note_type
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
    }

    /// Sanitized search text, `None` when nothing usable remains.
    pub fn search_terms(&self) -> Option<String> {
        self.search.as_deref().and_then(sanitize_search_text)
    }

    /// Evaluate the filter against a note.
    pub fn matches(&self, note: &MedicalNote) -> bool {
        if let Some(status) = self.status {
            if note.status != status {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if note.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if note.created_at > before {
                return false;
            }
        }
        if let Some(patient_id) = &self.patient_id {
            if note.patient_id.as_deref() != Some(patient_id.as_str()) {
                return false;
            }
        }
        if let Some(note_type) = self.normalized_note_type() {
            match &note.extraction {
                Some(e) if e.note_type == note_type => {}
                _ => return false,
            }
        }
        if let Some(want_gaps) = self.has_documentation_gaps {
            let has_gaps = note
                .extraction
                .as_ref()
                .is_some_and(|e| !e.documentation_gaps.is_empty());
            if has_gaps != want_gaps {
                return false;
            }
        }
        if let Some(terms) = self.search_terms() {
            let haystack = note.text.to_lowercase();
            if !terms
                .split_whitespace()
                .all(|t| haystack.contains(&t.to_lowercase()))
            {
                return false;
            }
        }
        true
    }
}

/// Keep only alphanumerics and whitespace, collapsing runs of whitespace.
///
/// Returns `None` if nothing remains.
pub fn sanitize_search_text(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}
