//! Note filter query builder.
//!
//! Turns a [`NoteFilter`] into a parameterized SQL predicate over the
//! `medical_note n` alias. Clauses combine with AND; an empty filter yields
//! `TRUE`.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;

use rinova_core::NoteFilter;

/// Type-safe parameter binding for SQL queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// Timestamp parameter.
    Timestamp(DateTime<Utc>),
    /// String parameter.
    String(String),
}

/// Bind builder parameters to a query in order.
pub fn bind_params<'q>(
    mut q: Query<'q, Postgres, PgArguments>,
    params: &'q [QueryParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        q = match param {
            QueryParam::Timestamp(ts) => q.bind(ts),
            QueryParam::String(s) => q.bind(s),
        };
    }
    q
}

/// SQL expression that is true when a note's result lists at least one gap.
const HAS_GAPS_SQL: &str = "COALESCE(jsonb_array_length(CASE WHEN jsonb_typeof(n.extraction->'documentation_gaps') = 'array' THEN n.extraction->'documentation_gaps' END), 0) > 0";

/// Generates SQL WHERE clause fragments for a [`NoteFilter`].
///
/// # Example
///
/// ```
/// use rinova_core::{NoteFilter, NoteStatus};
/// use rinova_db::NoteFilterQueryBuilder;
///
/// let filter = NoteFilter::new().with_status(NoteStatus::Failed);
/// let (sql, params) = NoteFilterQueryBuilder::new(&filter, 0).build();
/// assert_eq!(sql, "n.status = $1::note_status");
/// assert_eq!(params.len(), 1);
/// ```
pub struct NoteFilterQueryBuilder<'a> {
    filter: &'a NoteFilter,
    param_offset: usize,
}

impl<'a> NoteFilterQueryBuilder<'a> {
    /// Create a new builder.
    ///
    /// `param_offset` is the number of parameters already bound ahead of the
    /// filter in the final query.
    pub fn new(filter: &'a NoteFilter, param_offset: usize) -> Self {
        Self {
            filter,
            param_offset,
        }
    }

    /// Build the WHERE clause fragment and its parameters, in binding order.
    pub fn build(&self) -> (String, Vec<QueryParam>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        let mut param_idx = self.param_offset;

        if let Some(status) = self.filter.status {
            param_idx += 1;
            clauses.push(format!("n.status = ${}::note_status", param_idx));
            params.push(QueryParam::String(status.as_str().to_string()));
        }

        if let Some(after) = self.filter.created_after {
            param_idx += 1;
            clauses.push(format!("n.created_at >= ${}", param_idx));
            params.push(QueryParam::Timestamp(after));
        }

        if let Some(before) = self.filter.created_before {
            param_idx += 1;
            clauses.push(format!("n.created_at <= ${}", param_idx));
            params.push(QueryParam::Timestamp(before));
        }

        if let Some(patient_id) = &self.filter.patient_id {
            param_idx += 1;
            clauses.push(format!("n.patient_id = ${}", param_idx));
            params.push(QueryParam::String(patient_id.clone()));
        }

        if let Some(note_type) = self.filter.normalized_note_type() {
            param_idx += 1;
            clauses.push(format!("n.extraction->>'note_type' = ${}", param_idx));
            params.push(QueryParam::String(note_type));
        }

        match self.filter.has_documentation_gaps {
            Some(true) => clauses.push(HAS_GAPS_SQL.to_string()),
            Some(false) => clauses.push(format!("NOT ({})", HAS_GAPS_SQL)),
            None => {}
        }

        // Sanitized text only; plainto_tsquery ignores operator syntax anyway.
        if let Some(terms) = self.filter.search_terms() {
            param_idx += 1;
            clauses.push(format!(
                "n.tsv @@ plainto_tsquery('english', ${})",
                param_idx
            ));
            params.push(QueryParam::String(terms));
        }

        let sql = if clauses.is_empty() {
            "TRUE".to_string()
        } else {
            clauses.join(" AND ")
        };

        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rinova_core::NoteStatus;

    #[test]
    fn test_empty_filter_returns_true() {
        let filter = NoteFilter::default();
        let (sql, params) = NoteFilterQueryBuilder::new(&filter, 0).build();
        assert_eq!(sql, "TRUE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_blank_search_returns_true() {
        let filter = NoteFilter::new().with_search("!!! ---");
        let (sql, params) = NoteFilterQueryBuilder::new(&filter, 0).build();
        assert_eq!(sql, "TRUE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_status_clause() {
        let filter = NoteFilter::new().with_status(NoteStatus::InProgress);
        let (sql, params) = NoteFilterQueryBuilder::new(&filter, 0).build();
        assert_eq!(sql, "n.status = $1::note_status");
        assert_eq!(params, vec![QueryParam::String("in_progress".into())]);
    }

    #[test]
    fn test_param_offset_is_respected() {
        let filter = NoteFilter::new().with_patient_id("P-7");
        let (sql, _) = NoteFilterQueryBuilder::new(&filter, 2).build();
        assert_eq!(sql, "n.patient_id = $3");
    }

    #[test]
    fn test_open_ended_date_range() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let filter = NoteFilter::new().created_between(Some(start), None);
        let (sql, params) = NoteFilterQueryBuilder::new(&filter, 0).build();
        assert_eq!(sql, "n.created_at >= $1");
        assert_eq!(params, vec![QueryParam::Timestamp(start)]);

        let filter = NoteFilter::new().created_between(None, Some(start));
        let (sql, _) = NoteFilterQueryBuilder::new(&filter, 0).build();
        assert_eq!(sql, "n.created_at <= $1");
    }

    #[test]
    fn test_search_is_sanitized() {
        let filter = NoteFilter::new().with_search("chest & pain | !fever");
        let (sql, params) = NoteFilterQueryBuilder::new(&filter, 0).build();
        assert_eq!(sql, "n.tsv @@ plainto_tsquery('english', $1)");
        assert_eq!(params, vec![QueryParam::String("chest pain fever".into())]);
    }

    #[test]
    fn test_gap_presence_has_no_params() {
        let filter = NoteFilter::new().with_documentation_gaps(true);
        let (sql, params) = NoteFilterQueryBuilder::new(&filter, 0).build();
        assert!(sql.contains("jsonb_array_length"));
        assert!(!sql.starts_with("NOT"));
        assert!(params.is_empty());

        let filter = NoteFilter::new().with_documentation_gaps(false);
        let (sql, _) = NoteFilterQueryBuilder::new(&filter, 0).build();
        assert!(sql.starts_with("NOT ("));
    }

    #[test]
    fn test_all_clauses_combine_in_order() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let filter = NoteFilter::new()
            .with_status(NoteStatus::Completed)
            .created_between(Some(start), Some(end))
            .with_patient_id("P-1")
            .with_note_type("SOAP")
            .with_documentation_gaps(true)
            .with_search("asthma");
        let (sql, params) = NoteFilterQueryBuilder::new(&filter, 0).build();

        assert_eq!(sql.matches(" AND ").count(), 6);
        for i in 1..=6 {
            assert!(sql.contains(&format!("${i}")), "missing ${i} in {sql}");
        }
        assert!(!sql.contains("$7"));
        assert_eq!(params.len(), 6);
        assert_eq!(params[4], QueryParam::String("soap".into()));
        assert_eq!(params[5], QueryParam::String("asthma".into()));
    }
}
