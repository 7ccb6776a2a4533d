//! Route table and middleware stack.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{admin, extraction, notes, system};
use crate::openapi::ApiDoc;
use crate::AppState;

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            warn!(subsystem = "api", path = %request.uri().path(), "Rate limit exceeded");
            return Err(ApiError::TooManyRequests(
                "Too many requests. Please wait before retrying.".to_string(),
            ));
        }
    }
    Ok(next.run(request).await)
}

/// Build the application router with all layers applied.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(state.config.allowed_origins.clone()))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600));
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health_check))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Extraction
        .route("/api/v1/extract", post(extraction::extract))
        .route("/api/v1/extract/batch", post(extraction::extract_batch))
        // Notes
        .route("/api/v1/notes", get(notes::list_notes))
        .route("/api/v1/notes/dashboard", get(notes::dashboard))
        .route("/api/v1/notes/:id", get(notes::get_note))
        .route("/api/v1/notes/:id/reprocess", post(notes::reprocess_note))
        .route("/api/v1/search", get(notes::search_notes))
        // Admin
        .route("/api/v1/admin/system/stats", get(admin::system_stats))
        .route("/api/v1/admin/queue/status", get(admin::queue_status))
        .route(
            "/api/v1/admin/performance/metrics",
            get(admin::performance_metrics),
        )
        .route("/api/v1/admin/maintenance/cleanup", post(admin::cleanup))
        .route(
            "/api/v1/admin/maintenance/reprocess",
            post(admin::reprocess_failed),
        )
        .route("/api/v1/admin/maintenance/optimize", post(admin::optimize))
        // Middleware
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
