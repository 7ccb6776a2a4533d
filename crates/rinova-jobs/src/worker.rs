//! Background worker that re-runs extraction for requeued notes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use rinova_core::{defaults, Error, NoteRepository, Result};

use crate::pipeline::ExtractionPipeline;

/// Configuration for the reprocessing worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when nothing is queued.
    pub poll_interval_ms: u64,
    /// Notes claimed per poll.
    pub batch_size: i64,
    /// Extractions running at once.
    pub max_concurrent: usize,
    /// `in_progress` notes older than this are failed as abandoned.
    pub stale_after: Duration,
    /// Whether to run at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::WORKER_POLL_INTERVAL_MS,
            batch_size: defaults::WORKER_BATCH_SIZE,
            max_concurrent: defaults::MAX_CONCURRENT_EXTRACTIONS,
            stale_after: Duration::from_secs(defaults::WORKER_STALE_AFTER_SECS),
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_ENABLED` | `true` | Enable/disable reprocessing |
    /// | `WORKER_POLL_INTERVAL_MS` | `5000` | Polling interval when the queue is empty |
    /// | `MAX_CONCURRENT_EXTRACTIONS` | `10` | Extractions running at once |
    pub fn from_env() -> Self {
        let enabled = std::env::var("WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var("WORKER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::WORKER_POLL_INTERVAL_MS);

        let max_concurrent = std::env::var("MAX_CONCURRENT_EXTRACTIONS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::MAX_CONCURRENT_EXTRACTIONS)
            .max(1);

        Self {
            poll_interval_ms,
            max_concurrent,
            enabled,
            ..Self::default()
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set notes claimed per poll.
    pub fn with_batch_size(mut self, n: i64) -> Self {
        self.batch_size = n.max(1);
        self
    }

    /// Set maximum concurrent extractions.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Set the abandonment threshold.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Enable or disable the worker.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A requeued note was claimed.
    NoteStarted { note_id: Uuid, attempt: i32 },
    /// Extraction succeeded.
    NoteCompleted { note_id: Uuid },
    /// Extraction failed again.
    NoteFailed { note_id: Uuid, error: String },
    /// Stale `in_progress` notes were failed.
    AbandonedFailed { count: u64 },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Polls for requeued notes and runs them through the pipeline.
pub struct ReprocessWorker {
    notes: Arc<dyn NoteRepository>,
    pipeline: Arc<ExtractionPipeline>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl ReprocessWorker {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        pipeline: Arc<ExtractionPipeline>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::WORKER_EVENT_CAPACITY);
        Self {
            notes,
            pipeline,
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!(subsystem = "jobs", "Reprocess worker is disabled, not starting");
            return;
        }

        info!(
            subsystem = "jobs",
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            max_concurrent = self.config.max_concurrent,
            "Reprocess worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!(subsystem = "jobs", "Reprocess worker received shutdown signal");
                break;
            }

            let processed = match self.run_once().await {
                Ok(n) => n,
                Err(e) => {
                    error!(subsystem = "jobs", error = %e, "Reprocess poll failed");
                    0
                }
            };

            if processed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(subsystem = "jobs", "Reprocess worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            }
            // Otherwise poll again immediately: the queue may hold more.
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!(subsystem = "jobs", "Reprocess worker stopped");
    }

    /// One poll: fail abandoned claims, then claim and process a batch.
    ///
    /// Returns the number of notes processed.
    pub async fn run_once(&self) -> Result<usize> {
        let stale = chrono::Duration::from_std(self.config.stale_after)
            .map_err(|e| Error::Config(format!("invalid stale_after: {e}")))?;
        let abandoned = self.notes.fail_abandoned(Utc::now() - stale).await?;
        if abandoned > 0 {
            let _ = self
                .event_tx
                .send(WorkerEvent::AbandonedFailed { count: abandoned });
        }

        let claimed = self.notes.claim_requeued(self.config.batch_size).await?;
        if claimed.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let count = claimed.len();
        debug!(subsystem = "jobs", claimed = count, "Processing requeued notes");

        stream::iter(claimed)
            .for_each_concurrent(self.config.max_concurrent, |note| async move {
                let _ = self.event_tx.send(WorkerEvent::NoteStarted {
                    note_id: note.id,
                    attempt: note.extraction_attempts,
                });
                let outcome = self.pipeline.process_claimed(&note).await;
                let event = match outcome.result {
                    Ok(_) => WorkerEvent::NoteCompleted { note_id: note.id },
                    Err(e) => WorkerEvent::NoteFailed {
                        note_id: note.id,
                        error: e.to_string(),
                    },
                };
                let _ = self.event_tx.send(event);
            })
            .await;

        info!(
            subsystem = "jobs",
            component = "worker",
            result_count = count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Reprocessed notes"
        );
        Ok(count)
    }
}
