//! Dashboard and admin aggregates computed in PostgreSQL.
//!
//! Counts and code frequencies are grouped in SQL. The documentation quality
//! scores need the whole extraction document, so completed notes in the
//! window are streamed back and scored by `rinova_core::quality`.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};

use rinova_core::quality::{
    percentage, status_breakdown, status_percentages, success_rate, QualityAccumulator,
};
use rinova_core::{
    normalize_extraction, normalize_status, AnalyticsRepository, CodeCategory, CodeFrequency,
    DailyCount, DashboardRequest, DashboardStats, Error, NoteFilter, NoteStatus,
    PerformanceMetrics, QueueStatusEntry, Result, SystemStats, Timeframe,
};

use crate::filter::{bind_params, NoteFilterQueryBuilder, QueryParam};

/// Upper bound on completed notes scored per dashboard request. Past it,
/// quality scores cover the most recent notes in the window.
pub const QUALITY_SAMPLE_LIMIT: i64 = 10_000;

const PROCESSING_MS_SQL: &str = "CASE WHEN jsonb_typeof(n.extraction->'metadata'->'processing_time_ms') = 'number' \
     THEN (n.extraction->'metadata'->>'processing_time_ms')::float8 END";

/// PostgreSQL implementation of AnalyticsRepository.
pub struct PgAnalyticsRepository {
    pool: Pool<Postgres>,
}

impl PgAnalyticsRepository {
    /// Create a new PgAnalyticsRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Narrow the filter's lower bound to the look-back window.
    fn windowed(filter: &NoteFilter, days: i64) -> NoteFilter {
        let mut filter = filter.clone();
        if days > 0 {
            let cutoff = Utc::now() - Duration::days(days);
            filter.created_after = Some(match filter.created_after {
                Some(after) if after > cutoff => after,
                _ => cutoff,
            });
        }
        filter
    }

    async fn status_counts(
        &self,
        where_sql: &str,
        params: &[QueryParam],
    ) -> Result<BTreeMap<String, i64>> {
        let sql = format!(
            "SELECT n.status::text AS status, COUNT(*) AS count
             FROM medical_note n WHERE {where_sql} GROUP BY n.status"
        );
        let rows = bind_params(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(status_breakdown(rows.iter().filter_map(|row| {
            let status: String = row.get("status");
            normalize_status(&status).map(|s| (s, row.get::<i64, _>("count")))
        })))
    }

    /// Most frequent codes. Each code carries the description from the
    /// earliest note that mentions it.
    async fn top_codes(
        &self,
        where_sql: &str,
        params: &[QueryParam],
        limit: i64,
    ) -> Result<Vec<CodeFrequency>> {
        let unwind = |category: CodeCategory| {
            let field = category.field();
            format!(
                "SELECT '{cat}' AS category, e->>'code' AS code, COALESCE(e->>'description', '') AS description,
                        n.created_at, n.id
                 FROM medical_note n,
                      jsonb_array_elements(CASE WHEN jsonb_typeof(n.extraction->'{field}') = 'array'
                                                THEN n.extraction->'{field}' ELSE '[]'::jsonb END) e
                 WHERE {where_sql}",
                cat = category.as_str(),
            )
        };
        let sql = format!(
            "SELECT c.category, c.code,
                    (ARRAY_AGG(c.description ORDER BY c.created_at, c.id))[1] AS description,
                    COUNT(*) AS count
             FROM ({} UNION ALL {} UNION ALL {}) c
             WHERE c.code IS NOT NULL AND c.code <> ''
             GROUP BY c.category, c.code
             ORDER BY count DESC, c.code ASC
             LIMIT ${}",
            unwind(CodeCategory::Icd10),
            unwind(CodeCategory::Cpt),
            unwind(CodeCategory::Hcpcs),
            params.len() + 1,
        );
        let rows = bind_params(sqlx::query(&sql), params)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let category = match row.get::<String, _>("category").as_str() {
                    "icd10" => CodeCategory::Icd10,
                    "cpt" => CodeCategory::Cpt,
                    "hcpcs" => CodeCategory::Hcpcs,
                    _ => return None,
                };
                Some(CodeFrequency {
                    code: row.get("code"),
                    category,
                    description: row.get("description"),
                    count: row.get("count"),
                })
            })
            .collect())
    }

    async fn quality(
        &self,
        where_sql: &str,
        params: &[QueryParam],
    ) -> Result<rinova_core::QualityScores> {
        let sql = format!(
            "SELECT n.id, n.extraction, n.created_at, n.updated_at, n.extraction_attempts
             FROM medical_note n
             WHERE {where_sql} AND n.status = 'completed'::note_status AND n.extraction IS NOT NULL
             ORDER BY n.created_at DESC
             LIMIT {QUALITY_SAMPLE_LIMIT}"
        );
        let rows = bind_params(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        if rows.len() as i64 >= QUALITY_SAMPLE_LIMIT {
            debug!(
                subsystem = "database",
                component = "analytics",
                sample_limit = QUALITY_SAMPLE_LIMIT,
                "Quality scores computed on the most recent completed notes only"
            );
        }

        let mut acc = QualityAccumulator::default();
        for row in &rows {
            let doc: JsonValue = row.get("extraction");
            match normalize_extraction(doc) {
                Ok(result) => {
                    let created: chrono::DateTime<Utc> = row.get("created_at");
                    let updated: chrono::DateTime<Utc> = row.get("updated_at");
                    let turnaround =
                        (updated - created).num_milliseconds().max(0) as f64 / 1000.0;
                    acc.add(&result, turnaround, row.get("extraction_attempts"));
                }
                Err(e) => warn!(
                    subsystem = "database",
                    component = "analytics",
                    note_id = %row.get::<uuid::Uuid, _>("id"),
                    error = %e,
                    "Skipping unreadable extraction in quality scores"
                ),
            }
        }
        Ok(acc.finish())
    }
}

#[async_trait]
impl AnalyticsRepository for PgAnalyticsRepository {
    async fn dashboard(&self, req: DashboardRequest) -> Result<DashboardStats> {
        let start = Instant::now();
        let filter = Self::windowed(&req.filter, req.days);
        let (where_sql, params) = NoteFilterQueryBuilder::new(&filter, 0).build();

        let status_counts = self.status_counts(&where_sql, &params).await?;
        let total: i64 = status_counts.values().sum();

        let type_sql = format!(
            "SELECT COALESCE(n.extraction->>'note_type', 'brief') AS note_type, COUNT(*) AS count
             FROM medical_note n WHERE {where_sql} AND n.extraction IS NOT NULL
             GROUP BY 1"
        );
        let note_type_counts: BTreeMap<String, i64> = bind_params(sqlx::query(&type_sql), &params)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?
            .iter()
            .map(|row| (row.get("note_type"), row.get("count")))
            .collect();

        let avg_sql = format!(
            "SELECT AVG({PROCESSING_MS_SQL}) AS avg_ms
             FROM medical_note n WHERE {where_sql} AND n.status = 'completed'::note_status"
        );
        let avg_processing_time_ms: Option<f64> = bind_params(sqlx::query(&avg_sql), &params)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?
            .get("avg_ms");

        let daily_sql = format!(
            "SELECT (n.created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) AS count
             FROM medical_note n WHERE {where_sql}
             GROUP BY day ORDER BY day"
        );
        let daily_counts: Vec<DailyCount> = bind_params(sqlx::query(&daily_sql), &params)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?
            .iter()
            .map(|row| DailyCount {
                date: row.get::<NaiveDate, _>("day"),
                count: row.get("count"),
            })
            .collect();

        let top_codes = self
            .top_codes(&where_sql, &params, req.top_codes.max(0))
            .await?;
        let quality = self.quality(&where_sql, &params).await?;

        let completed = status_counts.get(NoteStatus::Completed.as_str()).copied().unwrap_or(0);
        let failed = status_counts.get(NoteStatus::Failed.as_str()).copied().unwrap_or(0);

        debug!(
            subsystem = "database",
            component = "analytics",
            op = "dashboard",
            total,
            duration_ms = start.elapsed().as_millis() as u64,
            "Computed dashboard"
        );

        Ok(DashboardStats {
            total_notes: total,
            status_percentages: status_percentages(&status_counts, total),
            status_counts,
            note_type_counts,
            success_rate: success_rate(completed, failed),
            avg_processing_time_ms: avg_processing_time_ms.unwrap_or(0.0),
            top_codes,
            daily_counts,
            quality,
        })
    }

    async fn system_stats(&self) -> Result<SystemStats> {
        let now = Utc::now();
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE created_at >= $1) AS last_24h,
                COUNT(*) FILTER (WHERE created_at >= $2) AS last_7d
             FROM medical_note",
        )
        .bind(now - Duration::hours(24))
        .bind(now - Duration::days(7))
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(SystemStats {
            total_notes: row.get("total"),
            notes_last_24h: row.get("last_24h"),
            notes_last_7d: row.get("last_7d"),
            status_counts: self.status_counts("TRUE", &[]).await?,
        })
    }

    async fn queue_status(&self) -> Result<Vec<QueueStatusEntry>> {
        let rows = sqlx::query(
            "SELECT status::text AS status, COUNT(*) AS count,
                    AVG(EXTRACT(EPOCH FROM ($1 - created_at)) / 60.0)::float8 AS avg_wait
             FROM medical_note GROUP BY status",
        )
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut by_status: BTreeMap<&'static str, (i64, f64)> = BTreeMap::new();
        for row in &rows {
            let status: String = row.get("status");
            if let Some(s) = normalize_status(&status) {
                let avg: Option<f64> = row.get("avg_wait");
                by_status.insert(s.as_str(), (row.get("count"), avg.unwrap_or(0.0)));
            }
        }

        Ok(NoteStatus::ALL
            .iter()
            .map(|s| {
                let (count, avg_wait_minutes) =
                    by_status.get(s.as_str()).copied().unwrap_or((0, 0.0));
                QueueStatusEntry {
                    status: *s,
                    count,
                    avg_wait_minutes,
                }
            })
            .collect())
    }

    async fn performance_metrics(&self, timeframe: Timeframe) -> Result<PerformanceMetrics> {
        let cutoff = Utc::now() - Duration::hours(timeframe.hours());
        let sql = format!(
            "SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE n.status = 'completed'::note_status) AS completed,
                COUNT(*) FILTER (WHERE n.status = 'failed'::note_status) AS failed,
                AVG({PROCESSING_MS_SQL}) FILTER (WHERE n.status = 'completed'::note_status) AS avg_ms,
                MAX({PROCESSING_MS_SQL}) FILTER (WHERE n.status = 'completed'::note_status) AS max_ms,
                AVG(n.extraction_attempts)::float8 AS avg_attempts
             FROM medical_note n
             WHERE n.created_at >= $1"
        );
        let row = sqlx::query(&sql)
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let total: i64 = row.get("total");
        let completed: i64 = row.get("completed");
        let failed: i64 = row.get("failed");
        debug!(
            subsystem = "database",
            component = "analytics",
            op = "performance_metrics",
            total,
            completion_pct = percentage(completed, total),
            "Computed performance metrics"
        );

        Ok(PerformanceMetrics {
            timeframe,
            total,
            completed,
            failed,
            success_rate: success_rate(completed, failed),
            avg_processing_time_ms: row.get::<Option<f64>, _>("avg_ms").unwrap_or(0.0),
            max_processing_time_ms: row.get::<Option<f64>, _>("max_ms").unwrap_or(0.0),
            avg_attempts: row.get::<Option<f64>, _>("avg_attempts").unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_tightens_lower_bound() {
        let filter = NoteFilter::new();
        let windowed = PgAnalyticsRepository::windowed(&filter, 30);
        let after = windowed.created_after.unwrap();
        let expected = Utc::now() - Duration::days(30);
        assert!((after - expected).num_seconds().abs() < 5);
    }

    #[test]
    fn test_window_keeps_tighter_filter_bound() {
        let recent = Utc::now() - Duration::days(2);
        let filter = NoteFilter::new().created_between(Some(recent), None);
        let windowed = PgAnalyticsRepository::windowed(&filter, 30);
        assert_eq!(windowed.created_after, Some(recent));
    }

    #[test]
    fn test_zero_days_disables_window() {
        let filter = NoteFilter::new();
        let windowed = PgAnalyticsRepository::windowed(&filter, 0);
        assert!(windowed.created_after.is_none());
    }
}
