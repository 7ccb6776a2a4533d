//! Administrative statistics and maintenance endpoints.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use rinova_core::{PerformanceMetrics, QueueStatusEntry, StorageStats, SystemStats};

use crate::error::{ApiError, ErrorEnvelope};
use crate::query_types::{CleanupQuery, ReprocessQuery, TimeframeQuery};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CleanupResponse {
    /// Failed and pending notes deleted.
    pub deleted: u64,
    /// Notes created before this instant were eligible.
    pub cutoff: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RequeueResponse {
    /// Failed notes moved back to `pending`.
    pub requeued: u64,
    /// Notes with this many attempts were skipped.
    pub max_attempts: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OptimizeResponse {
    pub message: String,
    pub stats: StorageStats,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/system/stats",
    tag = "Admin",
    responses((status = 200, description = "Collection-wide counters", body = SystemStats))
)]
pub async fn system_stats(State(state): State<AppState>) -> Result<Json<SystemStats>, ApiError> {
    Ok(Json(state.analytics.system_stats().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/queue/status",
    tag = "Admin",
    responses((status = 200, description = "Count and average wait per status", body = [QueueStatusEntry]))
)]
pub async fn queue_status(
    State(state): State<AppState>,
) -> Result<Json<Vec<QueueStatusEntry>>, ApiError> {
    Ok(Json(state.analytics.queue_status().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/performance/metrics",
    tag = "Admin",
    params(TimeframeQuery),
    responses(
        (status = 200, description = "Processing metrics for the window", body = PerformanceMetrics),
        (status = 422, description = "Unknown timeframe", body = ErrorEnvelope)
    )
)]
pub async fn performance_metrics(
    State(state): State<AppState>,
    query: Result<Query<TimeframeQuery>, QueryRejection>,
) -> Result<Json<PerformanceMetrics>, ApiError> {
    let Query(query) = query?;
    let timeframe = query.timeframe()?;
    Ok(Json(state.analytics.performance_metrics(timeframe).await?))
}

/// Delete failed and pending notes older than `days`. Completed notes are kept.
#[utoipa::path(
    post,
    path = "/api/v1/admin/maintenance/cleanup",
    tag = "Admin",
    params(CleanupQuery),
    responses(
        (status = 200, description = "Stale notes deleted", body = CleanupResponse),
        (status = 422, description = "days outside 7 to 36500", body = ErrorEnvelope)
    )
)]
pub async fn cleanup(
    State(state): State<AppState>,
    query: Result<Query<CleanupQuery>, QueryRejection>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let Query(query) = query?;
    let days = query.days()?;
    let cutoff = query.cutoff(Utc::now())?;
    let deleted = state.notes.purge_stale(cutoff).await?;

    info!(
        subsystem = "api",
        component = "admin",
        op = "cleanup",
        days,
        deleted,
        "Stale notes deleted"
    );
    Ok(Json(CleanupResponse { deleted, cutoff }))
}

/// Requeue failed notes that still have attempts left.
#[utoipa::path(
    post,
    path = "/api/v1/admin/maintenance/reprocess",
    tag = "Admin",
    params(ReprocessQuery),
    responses(
        (status = 200, description = "Failed notes requeued", body = RequeueResponse),
        (status = 422, description = "limit out of range", body = ErrorEnvelope)
    )
)]
pub async fn reprocess_failed(
    State(state): State<AppState>,
    query: Result<Query<ReprocessQuery>, QueryRejection>,
) -> Result<Json<RequeueResponse>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit()?;
    let max_attempts = state.config.max_extraction_attempts;
    let requeued = state.notes.requeue_failed(limit, max_attempts).await?;

    info!(
        subsystem = "api",
        component = "admin",
        op = "reprocess",
        limit,
        requeued,
        "Failed notes requeued"
    );
    Ok(Json(RequeueResponse {
        requeued,
        max_attempts,
    }))
}

/// Rebuild note indexes and refresh planner statistics.
#[utoipa::path(
    post,
    path = "/api/v1/admin/maintenance/optimize",
    tag = "Admin",
    responses((status = 200, description = "Store optimized", body = OptimizeResponse))
)]
pub async fn optimize(State(state): State<AppState>) -> Result<Json<OptimizeResponse>, ApiError> {
    let stats = state.notes.optimize().await?;
    info!(
        subsystem = "api",
        component = "admin",
        op = "optimize",
        total_notes = stats.total_notes,
        "Note store optimized"
    );
    Ok(Json(OptimizeResponse {
        message: "Database optimization completed".to_string(),
        stats,
    }))
}
