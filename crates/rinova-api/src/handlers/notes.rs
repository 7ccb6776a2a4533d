//! Note listing, search, lookup and dashboard endpoints.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use rinova_core::{DashboardStats, Error, ListNotesRequest, MedicalNote};

use crate::error::{ApiError, ErrorEnvelope};
use crate::query_types::{DashboardQuery, NotesQuery, PageInfo};
use crate::AppState;

/// One page of notes.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NotesPage {
    pub notes: Vec<MedicalNote>,
    /// Notes matching the filter across all pages.
    pub total: i64,
    pub page: PageInfo,
}

pub(crate) fn parse_note_id(raw: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(raw.trim()).map_err(|_| Error::InvalidId(format!("'{raw}' is not a note ID")))
}

async fn fetch_page(state: &AppState, req: ListNotesRequest) -> Result<NotesPage, ApiError> {
    let limit = req.effective_limit();
    let offset = req.effective_offset();
    let response = state.notes.list(req).await?;
    Ok(NotesPage {
        page: PageInfo::new(limit, offset, response.total),
        total: response.total,
        notes: response.notes,
    })
}

/// List notes with optional filters, paging and sorting.
#[utoipa::path(
    get,
    path = "/api/v1/notes",
    tag = "Notes",
    params(NotesQuery),
    responses(
        (status = 200, description = "Page of notes", body = NotesPage),
        (status = 422, description = "Invalid filter or paging value", body = ErrorEnvelope)
    )
)]
pub async fn list_notes(
    State(state): State<AppState>,
    query: Result<Query<NotesQuery>, QueryRejection>,
) -> Result<Json<NotesPage>, ApiError> {
    let Query(query) = query?;
    let req = query.into_request()?;
    Ok(Json(fetch_page(&state, req).await?))
}

/// Full-text search over note text with the listing filters.
#[utoipa::path(
    get,
    path = "/api/v1/search",
    tag = "Search",
    params(NotesQuery),
    responses(
        (status = 200, description = "Matching notes", body = NotesPage),
        (status = 422, description = "Missing or unusable search terms", body = ErrorEnvelope)
    )
)]
pub async fn search_notes(
    State(state): State<AppState>,
    query: Result<Query<NotesQuery>, QueryRejection>,
) -> Result<Json<NotesPage>, ApiError> {
    let Query(query) = query?;
    let req = query.into_request()?;
    let Some(terms) = req.filter.search_terms() else {
        return Err(Error::InvalidInput(
            "q must contain at least one letter or digit".to_string(),
        )
        .into());
    };

    let page = fetch_page(&state, req).await?;
    info!(
        subsystem = "api",
        component = "search",
        query_preview = %terms.chars().take(50).collect::<String>(),
        result_count = page.notes.len(),
        total = page.total,
        "Search completed"
    );
    Ok(Json(page))
}

/// Aggregate statistics over recent notes.
#[utoipa::path(
    get,
    path = "/api/v1/notes/dashboard",
    tag = "Notes",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Dashboard statistics", body = DashboardStats),
        (status = 422, description = "Invalid filter or window", body = ErrorEnvelope)
    )
)]
pub async fn dashboard(
    State(state): State<AppState>,
    query: Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<Json<DashboardStats>, ApiError> {
    let Query(query) = query?;
    let req = query.into_request()?;
    Ok(Json(state.analytics.dashboard(req).await?))
}

/// Fetch one note with its extraction result.
#[utoipa::path(
    get,
    path = "/api/v1/notes/{id}",
    tag = "Notes",
    params(("id" = String, Path, description = "Note ID")),
    responses(
        (status = 200, description = "The note", body = MedicalNote),
        (status = 400, description = "Malformed ID", body = ErrorEnvelope),
        (status = 404, description = "No such note", body = ErrorEnvelope)
    )
)]
pub async fn get_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MedicalNote>, ApiError> {
    let id = parse_note_id(&id)?;
    Ok(Json(state.notes.fetch(id).await?))
}

/// Put a failed note back in the queue for the reprocessing worker.
///
/// Notes that have used up their attempt budget are refused with 409.
#[utoipa::path(
    post,
    path = "/api/v1/notes/{id}/reprocess",
    tag = "Notes",
    params(("id" = String, Path, description = "Note ID")),
    responses(
        (status = 202, description = "Note requeued", body = MedicalNote),
        (status = 404, description = "No such note", body = ErrorEnvelope),
        (status = 409, description = "Note is not failed or has no attempts left", body = ErrorEnvelope)
    )
)]
pub async fn reprocess_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<MedicalNote>), ApiError> {
    let id = parse_note_id(&id)?;
    let max_attempts = state.config.max_extraction_attempts;

    let note = state.notes.fetch(id).await?;
    if note.extraction_attempts >= max_attempts {
        return Err(Error::Conflict(format!(
            "note {id} has used {} of {max_attempts} extraction attempts",
            note.extraction_attempts
        ))
        .into());
    }

    let note = state.notes.requeue(id).await?;
    info!(
        subsystem = "api",
        component = "notes",
        op = "reprocess",
        note_id = %id,
        attempts = note.extraction_attempts,
        "Note requeued"
    );
    Ok((StatusCode::ACCEPTED, Json(note)))
}
