//! Note repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rinova_core::{
    normalize_extraction, normalize_status, Error, ExtractionResult, ListNotesRequest,
    ListNotesResponse, MedicalNote, NewNote, NoteRepository, NoteStatus, Result, StorageStats,
};

use crate::filter::{bind_params, NoteFilterQueryBuilder};

/// Columns selected for a full [`MedicalNote`].
pub(crate) const NOTE_COLUMNS: &str = "id, text, source, patient_id, length, status::text AS status, \
     extraction_attempts, last_attempt_at, last_error, extraction, created_at, updated_at";

/// PostgreSQL implementation of NoteRepository.
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
}

impl PgNoteRepository {
    /// Create a new PgNoteRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Map a row selected with [`NOTE_COLUMNS`] into a note.
    ///
    /// The stored extraction document goes through versioned normalization,
    /// so rows written by older releases read back in the current shape.
    pub(crate) fn row_to_note(row: &PgRow) -> Result<MedicalNote> {
        let id: Uuid = row.get("id");
        let status_text: String = row.get("status");
        let status = normalize_status(&status_text).ok_or_else(|| {
            Error::Serialization(format!("note {id} has unknown status '{status_text}'"))
        })?;
        let extraction = row
            .get::<Option<JsonValue>, _>("extraction")
            .map(normalize_extraction)
            .transpose()?;

        Ok(MedicalNote {
            id,
            text: row.get("text"),
            source: row.get("source"),
            patient_id: row.get("patient_id"),
            length: row.get("length"),
            status,
            extraction_attempts: row.get("extraction_attempts"),
            last_attempt_at: row.get("last_attempt_at"),
            last_error: row.get("last_error"),
            extraction,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Map rows, skipping (and logging) the ones that cannot be decoded.
    pub(crate) fn rows_to_notes(rows: &[PgRow]) -> Vec<MedicalNote> {
        rows.iter()
            .filter_map(|row| match Self::row_to_note(row) {
                Ok(note) => Some(note),
                Err(e) => {
                    warn!(
                        subsystem = "database",
                        component = "notes",
                        note_id = %row.get::<Uuid, _>("id"),
                        error = %e,
                        "Skipping unreadable note"
                    );
                    None
                }
            })
            .collect()
    }

    /// Current status of a note, `None` if it does not exist.
    async fn current_status(&self, id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query("SELECT status::text AS status FROM medical_note WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.map(|r| r.get("status")))
    }

    /// Explain why a compare-and-set transition matched no row.
    async fn transition_error(&self, id: Uuid, expected: NoteStatus) -> Error {
        match self.current_status(id).await {
            Ok(None) => Error::NoteNotFound(id),
            Ok(Some(actual)) => Error::Conflict(format!(
                "note {id} is {actual}, expected {expected}"
            )),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn insert(&self, note: NewNote) -> Result<MedicalNote> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let length = i32::try_from(note.char_len())
            .map_err(|_| Error::InvalidInput("note text is too long".to_string()))?;

        let query = format!(
            "INSERT INTO medical_note (id, text, source, patient_id, length, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, 'pending'::note_status, $6, $6)
             RETURNING {NOTE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(&note.text)
            .bind(&note.source)
            .bind(&note.patient_id)
            .bind(length)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "notes",
            op = "insert",
            note_id = %id,
            note_len = length,
            "Stored note"
        );
        Self::row_to_note(&row)
    }

    async fn fetch(&self, id: Uuid) -> Result<MedicalNote> {
        let query = format!("SELECT {NOTE_COLUMNS} FROM medical_note WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::NoteNotFound(id))?;
        Self::row_to_note(&row)
    }

    async fn list(&self, req: ListNotesRequest) -> Result<ListNotesResponse> {
        let limit = req.effective_limit();
        let offset = req.effective_offset();
        let (where_sql, params) = NoteFilterQueryBuilder::new(&req.filter, 0).build();

        let count_sql = format!("SELECT COUNT(*) AS total FROM medical_note n WHERE {where_sql}");
        let total: i64 = bind_params(sqlx::query(&count_sql), &params)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?
            .get("total");

        let select_sql = format!(
            "SELECT {NOTE_COLUMNS} FROM medical_note n WHERE {where_sql}
             ORDER BY n.{} {}, n.id DESC
             LIMIT ${} OFFSET ${}",
            req.sort_by.column(),
            req.sort_order.sql(),
            params.len() + 1,
            params.len() + 2,
        );
        let rows = bind_params(sqlx::query(&select_sql), &params)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let notes = Self::rows_to_notes(&rows);
        debug!(
            subsystem = "database",
            component = "notes",
            op = "list",
            result_count = notes.len(),
            total,
            "Listed notes"
        );
        Ok(ListNotesResponse { notes, total })
    }

    async fn begin_extraction(&self, id: Uuid) -> Result<MedicalNote> {
        let now = Utc::now();
        let query = format!(
            "UPDATE medical_note
             SET status = 'in_progress'::note_status,
                 extraction_attempts = extraction_attempts + 1,
                 last_attempt_at = $2,
                 updated_at = $2
             WHERE id = $1 AND status = 'pending'::note_status
             RETURNING {NOTE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => Self::row_to_note(&row),
            None => Err(self.transition_error(id, NoteStatus::Pending).await),
        }
    }

    async fn complete_extraction(&self, id: Uuid, result: &ExtractionResult) -> Result<()> {
        let document = serde_json::to_value(result)?;
        let done = sqlx::query(
            "UPDATE medical_note
             SET status = 'completed'::note_status, extraction = $2, last_error = NULL, updated_at = $3
             WHERE id = $1 AND status = 'in_progress'::note_status",
        )
        .bind(id)
        .bind(document)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if done.rows_affected() == 0 {
            return Err(self.transition_error(id, NoteStatus::InProgress).await);
        }
        Ok(())
    }

    async fn fail_extraction(&self, id: Uuid, error: &str) -> Result<()> {
        let done = sqlx::query(
            "UPDATE medical_note
             SET status = 'failed'::note_status, last_error = $2, updated_at = $3
             WHERE id = $1 AND status = 'in_progress'::note_status",
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if done.rows_affected() == 0 {
            return Err(self.transition_error(id, NoteStatus::InProgress).await);
        }
        Ok(())
    }

    async fn requeue(&self, id: Uuid) -> Result<MedicalNote> {
        let query = format!(
            "UPDATE medical_note
             SET status = 'pending'::note_status, updated_at = $2
             WHERE id = $1 AND status = 'failed'::note_status
             RETURNING {NOTE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => Self::row_to_note(&row),
            None => Err(self.transition_error(id, NoteStatus::Failed).await),
        }
    }

    async fn requeue_failed(&self, limit: i64, max_attempts: i32) -> Result<u64> {
        let done = sqlx::query(
            "UPDATE medical_note SET status = 'pending'::note_status, updated_at = $1
             WHERE id IN (
                 SELECT id FROM medical_note
                 WHERE status = 'failed'::note_status AND extraction_attempts < $2
                 ORDER BY updated_at ASC
                 LIMIT $3
                 FOR UPDATE SKIP LOCKED
             )",
        )
        .bind(Utc::now())
        .bind(max_attempts)
        .bind(limit)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "notes",
            op = "requeue_failed",
            rows_affected = done.rows_affected(),
            "Requeued failed notes"
        );
        Ok(done.rows_affected())
    }

    async fn claim_requeued(&self, limit: i64) -> Result<Vec<MedicalNote>> {
        let now = Utc::now();
        let query = format!(
            "UPDATE medical_note
             SET status = 'in_progress'::note_status,
                 extraction_attempts = extraction_attempts + 1,
                 last_attempt_at = $1,
                 updated_at = $1
             WHERE id IN (
                 SELECT id FROM medical_note
                 WHERE status = 'pending'::note_status AND extraction_attempts > 0
                 ORDER BY updated_at ASC
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {NOTE_COLUMNS}"
        );
        let rows = sqlx::query(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(Self::rows_to_notes(&rows))
    }

    async fn fail_abandoned(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query(
            "UPDATE medical_note
             SET status = 'failed'::note_status,
                 last_error = 'extraction abandoned before completion',
                 updated_at = $2
             WHERE status = 'in_progress'::note_status AND last_attempt_at < $1",
        )
        .bind(cutoff)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if done.rows_affected() > 0 {
            warn!(
                subsystem = "database",
                component = "notes",
                op = "fail_abandoned",
                rows_affected = done.rows_affected(),
                "Failed abandoned extractions"
            );
        }
        Ok(done.rows_affected())
    }

    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query(
            "DELETE FROM medical_note
             WHERE status IN ('failed'::note_status, 'pending'::note_status) AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "notes",
            op = "purge_stale",
            rows_affected = done.rows_affected(),
            cutoff = %cutoff,
            "Purged stale notes"
        );
        Ok(done.rows_affected())
    }

    async fn optimize(&self) -> Result<StorageStats> {
        let start = std::time::Instant::now();
        for statement in ["REINDEX TABLE medical_note", "ANALYZE medical_note"] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        }

        let row = sqlx::query(
            "SELECT (SELECT COUNT(*) FROM medical_note) AS total_notes,
                    (SELECT COUNT(*) FROM pg_indexes WHERE tablename = 'medical_note') AS indexes,
                    pg_total_relation_size('medical_note') AS size_bytes",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let size_bytes: i64 = row.get("size_bytes");
        let stats = StorageStats {
            total_notes: row.get("total_notes"),
            indexes: row.get("indexes"),
            size_mb: (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        };
        info!(
            subsystem = "database",
            component = "notes",
            op = "optimize",
            total_notes = stats.total_notes,
            indexes = stats.indexes,
            duration_ms = start.elapsed().as_millis() as u64,
            "Reindexed and analyzed note table"
        );
        Ok(stats)
    }

    async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(true)
    }
}
