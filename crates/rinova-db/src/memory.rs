//! In-memory note store.
//!
//! Implements the same repository traits as the PostgreSQL layer, with the
//! same compare-and-set transitions, so the pipeline and the HTTP handlers can
//! be exercised without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use rinova_core::quality::{percentage, status_breakdown, success_rate};
use rinova_core::{
    AnalyticsRepository, DashboardRequest, DashboardStats, Error, ExtractionResult,
    ListNotesRequest, ListNotesResponse, MedicalNote, NewNote, NoteRepository, NoteSortField,
    NoteStatus, PerformanceMetrics, QueueStatusEntry, Result, SortOrder, StorageStats, SystemStats,
    Timeframe,
};

/// Note store backed by a `HashMap` behind an async lock.
#[derive(Default)]
pub struct MemoryNoteRepository {
    notes: RwLock<HashMap<Uuid, MedicalNote>>,
    unavailable: AtomicBool,
    outcome_writes_fail: AtomicBool,
}

impl MemoryNoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `complete_extraction` and `fail_extraction` fail while every
    /// other call keeps working.
    pub fn set_outcome_writes_failing(&self, failing: bool) {
        self.outcome_writes_fail.store(failing, Ordering::SeqCst);
    }

    fn check_outcome_writable(&self) -> Result<()> {
        if self.outcome_writes_fail.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    /// Insert a fully formed note, replacing any note with the same ID.
    pub async fn put(&self, note: MedicalNote) {
        self.notes.write().await.insert(note.id, note);
    }

    /// Snapshot of every stored note.
    pub async fn all(&self) -> Vec<MedicalNote> {
        self.notes.read().await.values().cloned().collect()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    /// Apply `update` to a note in status `expected`.
    async fn transition<F>(&self, id: Uuid, expected: NoteStatus, update: F) -> Result<MedicalNote>
    where
        F: FnOnce(&mut MedicalNote),
    {
        self.check_available()?;
        let mut notes = self.notes.write().await;
        let note = notes.get_mut(&id).ok_or(Error::NoteNotFound(id))?;
        if note.status != expected {
            return Err(Error::Conflict(format!(
                "note {id} is {}, expected {expected}",
                note.status
            )));
        }
        update(note);
        Ok(note.clone())
    }

    fn sort(notes: &mut [MedicalNote], field: NoteSortField, order: SortOrder) {
        notes.sort_by(|a, b| {
            let ord = match field {
                NoteSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                NoteSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                NoteSortField::Length => a.length.cmp(&b.length),
            };
            let ord = match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            ord.then_with(|| b.id.cmp(&a.id))
        });
    }
}

#[async_trait]
impl NoteRepository for MemoryNoteRepository {
    async fn insert(&self, note: NewNote) -> Result<MedicalNote> {
        self.check_available()?;
        let now = Utc::now();
        let length = i32::try_from(note.char_len())
            .map_err(|_| Error::InvalidInput("note text is too long".to_string()))?;
        let stored = MedicalNote {
            id: Uuid::now_v7(),
            text: note.text,
            source: note.source,
            patient_id: note.patient_id,
            length,
            status: NoteStatus::Pending,
            extraction_attempts: 0,
            last_attempt_at: None,
            last_error: None,
            extraction: None,
            created_at: now,
            updated_at: now,
        };
        self.notes.write().await.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn fetch(&self, id: Uuid) -> Result<MedicalNote> {
        self.check_available()?;
        self.notes
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NoteNotFound(id))
    }

    async fn list(&self, req: ListNotesRequest) -> Result<ListNotesResponse> {
        self.check_available()?;
        let mut matched: Vec<MedicalNote> = self
            .notes
            .read()
            .await
            .values()
            .filter(|n| req.filter.matches(n))
            .cloned()
            .collect();
        let total = matched.len() as i64;
        Self::sort(&mut matched, req.sort_by, req.sort_order);
        let notes = matched
            .into_iter()
            .skip(req.effective_offset() as usize)
            .take(req.effective_limit() as usize)
            .collect();
        Ok(ListNotesResponse { notes, total })
    }

    async fn begin_extraction(&self, id: Uuid) -> Result<MedicalNote> {
        let now = Utc::now();
        self.transition(id, NoteStatus::Pending, |n| {
            n.status = NoteStatus::InProgress;
            n.extraction_attempts += 1;
            n.last_attempt_at = Some(now);
            n.updated_at = now;
        })
        .await
    }

    async fn complete_extraction(&self, id: Uuid, result: &ExtractionResult) -> Result<()> {
        self.check_outcome_writable()?;
        let now = Utc::now();
        self.transition(id, NoteStatus::InProgress, |n| {
            n.status = NoteStatus::Completed;
            n.extraction = Some(result.clone());
            n.last_error = None;
            n.updated_at = now;
        })
        .await
        .map(|_| ())
    }

    async fn fail_extraction(&self, id: Uuid, error: &str) -> Result<()> {
        self.check_outcome_writable()?;
        let now = Utc::now();
        self.transition(id, NoteStatus::InProgress, |n| {
            n.status = NoteStatus::Failed;
            n.last_error = Some(error.to_string());
            n.updated_at = now;
        })
        .await
        .map(|_| ())
    }

    async fn requeue(&self, id: Uuid) -> Result<MedicalNote> {
        let now = Utc::now();
        self.transition(id, NoteStatus::Failed, |n| {
            n.status = NoteStatus::Pending;
            n.updated_at = now;
        })
        .await
    }

    async fn requeue_failed(&self, limit: i64, max_attempts: i32) -> Result<u64> {
        self.check_available()?;
        let now = Utc::now();
        let mut notes = self.notes.write().await;
        let mut eligible: Vec<&mut MedicalNote> = notes
            .values_mut()
            .filter(|n| n.status == NoteStatus::Failed && n.extraction_attempts < max_attempts)
            .collect();
        eligible.sort_by_key(|n| n.updated_at);
        let mut count = 0;
        for note in eligible.into_iter().take(limit.max(0) as usize) {
            note.status = NoteStatus::Pending;
            note.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn claim_requeued(&self, limit: i64) -> Result<Vec<MedicalNote>> {
        self.check_available()?;
        let now = Utc::now();
        let mut notes = self.notes.write().await;
        let mut eligible: Vec<&mut MedicalNote> = notes
            .values_mut()
            .filter(|n| n.status == NoteStatus::Pending && n.extraction_attempts > 0)
            .collect();
        eligible.sort_by_key(|n| n.updated_at);
        Ok(eligible
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|n| {
                n.status = NoteStatus::InProgress;
                n.extraction_attempts += 1;
                n.last_attempt_at = Some(now);
                n.updated_at = now;
                n.clone()
            })
            .collect())
    }

    async fn fail_abandoned(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.check_available()?;
        let now = Utc::now();
        let mut count = 0;
        for note in self.notes.write().await.values_mut() {
            let stale = note.last_attempt_at.is_some_and(|t| t < cutoff);
            if note.status == NoteStatus::InProgress && stale {
                note.status = NoteStatus::Failed;
                note.last_error = Some("extraction abandoned before completion".to_string());
                note.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.check_available()?;
        let mut notes = self.notes.write().await;
        let before = notes.len();
        notes.retain(|_, n| {
            !(matches!(n.status, NoteStatus::Failed | NoteStatus::Pending) && n.created_at < cutoff)
        });
        Ok((before - notes.len()) as u64)
    }

    async fn optimize(&self) -> Result<StorageStats> {
        self.check_available()?;
        Ok(StorageStats {
            total_notes: self.notes.read().await.len() as i64,
            ..Default::default()
        })
    }

    async fn health_check(&self) -> Result<bool> {
        self.check_available()?;
        Ok(true)
    }
}

#[async_trait]
impl AnalyticsRepository for MemoryNoteRepository {
    async fn dashboard(&self, req: DashboardRequest) -> Result<DashboardStats> {
        self.check_available()?;
        let cutoff = (req.days > 0).then(|| Utc::now() - Duration::days(req.days));
        let notes: Vec<MedicalNote> = self
            .notes
            .read()
            .await
            .values()
            .filter(|n| req.filter.matches(n))
            .filter(|n| cutoff.map_or(true, |c| n.created_at >= c))
            .cloned()
            .collect();
        Ok(DashboardStats::from_notes(&notes, req.top_codes.max(0) as usize))
    }

    async fn system_stats(&self) -> Result<SystemStats> {
        self.check_available()?;
        let now = Utc::now();
        let notes = self.notes.read().await;
        Ok(SystemStats {
            total_notes: notes.len() as i64,
            notes_last_24h: notes
                .values()
                .filter(|n| n.created_at >= now - Duration::hours(24))
                .count() as i64,
            notes_last_7d: notes
                .values()
                .filter(|n| n.created_at >= now - Duration::days(7))
                .count() as i64,
            status_counts: status_breakdown(notes.values().map(|n| (n.status, 1))),
        })
    }

    async fn queue_status(&self) -> Result<Vec<QueueStatusEntry>> {
        self.check_available()?;
        let now = Utc::now();
        let notes = self.notes.read().await;
        Ok(NoteStatus::ALL
            .iter()
            .map(|status| {
                let waits: Vec<f64> = notes
                    .values()
                    .filter(|n| n.status == *status)
                    .map(|n| (now - n.created_at).num_milliseconds() as f64 / 60_000.0)
                    .collect();
                let avg_wait_minutes = if waits.is_empty() {
                    0.0
                } else {
                    waits.iter().sum::<f64>() / waits.len() as f64
                };
                QueueStatusEntry {
                    status: *status,
                    count: waits.len() as i64,
                    avg_wait_minutes,
                }
            })
            .collect())
    }

    async fn performance_metrics(&self, timeframe: Timeframe) -> Result<PerformanceMetrics> {
        self.check_available()?;
        let cutoff = Utc::now() - Duration::hours(timeframe.hours());
        let notes = self.notes.read().await;
        let window: Vec<&MedicalNote> = notes.values().filter(|n| n.created_at >= cutoff).collect();

        let total = window.len() as i64;
        let completed = window
            .iter()
            .filter(|n| n.status == NoteStatus::Completed)
            .count() as i64;
        let failed = window
            .iter()
            .filter(|n| n.status == NoteStatus::Failed)
            .count() as i64;
        let times: Vec<f64> = window
            .iter()
            .filter(|n| n.status == NoteStatus::Completed)
            .filter_map(|n| n.extraction.as_ref())
            .map(|e| e.metadata.processing_time_ms as f64)
            .collect();
        let attempts: i64 = window.iter().map(|n| i64::from(n.extraction_attempts)).sum();

        tracing::debug!(
            subsystem = "database",
            component = "memory",
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
            avg_processing_time_ms: if times.is_empty() {
                0.0
            } else {
                times.iter().sum::<f64>() / times.len() as f64
            },
            max_processing_time_ms: times.iter().copied().fold(0.0, f64::max),
            avg_attempts: if total == 0 {
                0.0
            } else {
                attempts as f64 / total as f64
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rinova_core::{NoteFilter, ICD10Code, Evidence};

    fn result_with(code: &str) -> ExtractionResult {
        ExtractionResult {
            icd10_codes: vec![ICD10Code {
                code: code.into(),
                description: String::new(),
                confidence: 0.9,
                primary: true,
                evidence: Evidence::default(),
                suggestions: vec![],
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let repo = MemoryNoteRepository::new();
        let note = repo.insert(NewNote::new("Pt with HTN")).await.unwrap();
        assert_eq!(note.status, NoteStatus::Pending);
        assert_eq!(note.length, 11);

        let claimed = repo.begin_extraction(note.id).await.unwrap();
        assert_eq!(claimed.status, NoteStatus::InProgress);
        assert_eq!(claimed.extraction_attempts, 1);

        repo.complete_extraction(note.id, &result_with("I10")).await.unwrap();
        let done = repo.fetch(note.id).await.unwrap();
        assert_eq!(done.status, NoteStatus::Completed);
        assert_eq!(done.extraction.unwrap().icd10_codes[0].code, "I10");
    }

    #[tokio::test]
    async fn test_second_claim_conflicts() {
        let repo = MemoryNoteRepository::new();
        let note = repo.insert(NewNote::new("x")).await.unwrap();
        repo.begin_extraction(note.id).await.unwrap();
        let err = repo.begin_extraction(note.id).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_transitions_on_missing_note() {
        let repo = MemoryNoteRepository::new();
        let err = repo.begin_extraction(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, Error::NoteNotFound(_)));
    }

    #[tokio::test]
    async fn test_complete_requires_in_progress() {
        let repo = MemoryNoteRepository::new();
        let note = repo.insert(NewNote::new("x")).await.unwrap();
        let err = repo
            .complete_extraction(note.id, &ExtractionResult::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_requeue_and_claim() {
        let repo = MemoryNoteRepository::new();
        let note = repo.insert(NewNote::new("x")).await.unwrap();
        repo.begin_extraction(note.id).await.unwrap();
        repo.fail_extraction(note.id, "timeout").await.unwrap();

        // fresh pending notes are not claimed by the worker
        repo.insert(NewNote::new("fresh")).await.unwrap();

        assert_eq!(repo.requeue_failed(10, 5).await.unwrap(), 1);
        let claimed = repo.claim_requeued(10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, note.id);
        assert_eq!(claimed[0].extraction_attempts, 2);
        assert_eq!(claimed[0].last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_requeue_respects_attempt_budget() {
        let repo = MemoryNoteRepository::new();
        let note = repo.insert(NewNote::new("x")).await.unwrap();
        repo.begin_extraction(note.id).await.unwrap();
        repo.fail_extraction(note.id, "boom").await.unwrap();
        assert_eq!(repo.requeue_failed(10, 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_pages() {
        let repo = MemoryNoteRepository::new();
        for text in ["a", "bbb", "cc"] {
            repo.insert(NewNote::new(text)).await.unwrap();
        }
        let resp = repo
            .list(ListNotesRequest {
                limit: Some(2),
                sort_by: NoteSortField::Length,
                sort_order: SortOrder::Asc,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(resp.total, 3);
        let texts: Vec<&str> = resp.notes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "cc"]);

        let resp = repo
            .list(ListNotesRequest {
                filter: NoteFilter::new().with_search("bbb"),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(resp.total, 1);
    }

    #[tokio::test]
    async fn test_purge_stale_keeps_completed() {
        let repo = MemoryNoteRepository::new();
        let pending = repo.insert(NewNote::new("p")).await.unwrap();
        let done = repo.insert(NewNote::new("d")).await.unwrap();
        repo.begin_extraction(done.id).await.unwrap();
        repo.complete_extraction(done.id, &ExtractionResult::default())
            .await
            .unwrap();

        let purged = repo
            .purge_stale(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(repo.fetch(pending.id).await.is_err());
        assert!(repo.fetch(done.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let repo = MemoryNoteRepository::new();
        repo.set_unavailable(true);
        assert!(matches!(
            repo.insert(NewNote::new("x")).await,
            Err(Error::Database(_))
        ));
        assert!(repo.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_dashboard_and_queue() {
        let repo = MemoryNoteRepository::new();
        let stats = repo.dashboard(DashboardRequest::default()).await.unwrap();
        assert_eq!(stats.total_notes, 0);
        assert_eq!(stats.success_rate, 0.0);
        let queue = repo.queue_status().await.unwrap();
        assert_eq!(queue.len(), 4);
        assert!(queue.iter().all(|q| q.count == 0 && q.avg_wait_minutes == 0.0));
        let perf = repo.performance_metrics(Timeframe::Day).await.unwrap();
        assert_eq!(perf.total, 0);
        assert_eq!(perf.avg_attempts, 0.0);
    }
}
