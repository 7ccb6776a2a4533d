//! # rinova-jobs
//!
//! Extraction pipeline and background reprocessing for rinova.
//!
//! This crate provides:
//! - [`ExtractionPipeline`]: validate, store, claim, extract and record a note
//! - Bounded-concurrency batch extraction with per-item outcomes
//! - [`ReprocessWorker`]: polls for requeued notes and retries them
//! - Worker lifecycle events via broadcast channels
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rinova_jobs::{ExtractionPipeline, ReprocessWorker, WorkerConfig};
//!
//! let pipeline = Arc::new(ExtractionPipeline::new(notes.clone(), extractor));
//! let outcome = pipeline.extract_text("Pt with HTN, BP 160/95").await;
//!
//! let handle = ReprocessWorker::new(notes, pipeline, WorkerConfig::from_env()).start();
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//! handle.shutdown().await?;
//! ```

pub mod pipeline;
pub mod worker;

// Re-export core types
pub use rinova_core::*;

pub use pipeline::{ExtractionOutcome, ExtractionPipeline, PipelineConfig};
pub use worker::{ReprocessWorker, WorkerConfig, WorkerEvent, WorkerHandle};
