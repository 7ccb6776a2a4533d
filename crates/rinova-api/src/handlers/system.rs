//! Welcome banner and health check.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use rinova_core::Result;

use crate::AppState;

const HEALTHY: &str = "healthy";

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct WelcomeResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub docs_url: String,
}

/// Per-dependency health, `"healthy"` or `"unhealthy: <reason>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ServiceHealth {
    pub database: String,
    pub inference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthReport {
    /// `online` when every dependency is healthy, `degraded` otherwise.
    pub status: String,
    /// When the dependencies were probed.
    pub timestamp: DateTime<Utc>,
    pub api_version: String,
    pub services: ServiceHealth,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.services.database == HEALTHY && self.services.inference == HEALTHY
    }
}

fn describe(probe: Result<bool>) -> String {
    match probe {
        Ok(true) => HEALTHY.to_string(),
        Ok(false) => "unhealthy: not reachable".to_string(),
        Err(e) => format!("unhealthy: {e}"),
    }
}

async fn probe(state: &AppState) -> HealthReport {
    let (database, inference) =
        tokio::join!(state.notes.health_check(), state.inference.health_check());
    let services = ServiceHealth {
        database: describe(database),
        inference: describe(inference),
    };

    let healthy = services.database == HEALTHY && services.inference == HEALTHY;
    if healthy {
        debug!(subsystem = "api", component = "health", "Dependencies healthy");
    } else {
        warn!(
            subsystem = "api",
            component = "health",
            database = %services.database,
            inference = %services.inference,
            "Dependency health check failed"
        );
    }

    HealthReport {
        status: if healthy { "online" } else { "degraded" }.to_string(),
        timestamp: Utc::now(),
        api_version: env!("CARGO_PKG_VERSION").to_string(),
        services,
    }
}

#[utoipa::path(
    get,
    path = "/",
    tag = "System",
    responses((status = 200, description = "Welcome banner", body = WelcomeResponse))
)]
pub async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        status: "success".to_string(),
        message: "Welcome to Rinova API".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docs_url: "/docs".to_string(),
    })
}

/// Health of the database and the text-generation service.
///
/// Results are cached for `HEALTH_CACHE_TTL_SECS`.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    responses(
        (status = 200, description = "All dependencies healthy", body = HealthReport),
        (status = 503, description = "A dependency is unhealthy", body = HealthReport)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health.get_or_refresh(|| probe(&state)).await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
