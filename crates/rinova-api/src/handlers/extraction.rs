//! Code extraction endpoints.
//!
//! Both endpoints answer with [`ExtractionResponse`] bodies. A single
//! extraction carries the failure's status code; a batch answers 200 with a
//! `success` flag per item, in input order.

use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use rinova_core::{ExtractionResult, NewNote};
use rinova_jobs::ExtractionOutcome;

use crate::error::{ApiError, ErrorEnvelope};
use crate::AppState;

/// A clinical note to code.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct ExtractRequest {
    #[serde(alias = "text")]
    pub medical_text: String,
    /// Origin label stored with the note (default `api`).
    pub source: Option<String>,
    pub patient_id: Option<String>,
}

impl ExtractRequest {
    fn into_note(self) -> NewNote {
        let note = NewNote::new(self.medical_text).with_patient_id(self.patient_id);
        match self.source {
            Some(source) if !source.trim().is_empty() => note.with_source(source.trim()),
            _ => note,
        }
    }
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct BatchExtractRequest {
    #[serde(alias = "medical_texts")]
    pub texts: Vec<String>,
    pub source: Option<String>,
}

/// Outcome of one extraction.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ExtractionResponse {
    pub success: bool,
    pub data: Option<ExtractionResult>,
    /// ID of the stored note; absent when the text was rejected before storage.
    pub note_id: Option<Uuid>,
    pub error: Option<String>,
}

impl ExtractionResponse {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            data: None,
            note_id: None,
            error: Some(error),
        }
    }

    /// Convert a pipeline outcome into a response and its status code.
    fn from_outcome(outcome: ExtractionOutcome) -> (StatusCode, Self) {
        match outcome.result {
            Ok(data) => (
                StatusCode::OK,
                Self {
                    success: true,
                    data: Some(data),
                    note_id: outcome.note_id,
                    error: None,
                },
            ),
            Err(e) => {
                let err = ApiError::from(e);
                (
                    err.status(),
                    Self {
                        note_id: outcome.note_id,
                        ..Self::failure(err.to_string())
                    },
                )
            }
        }
    }
}

/// Extract codes from one clinical note.
#[utoipa::path(
    post,
    path = "/api/v1/extract",
    tag = "Extraction",
    request_body = ExtractRequest,
    responses(
        (status = 200, description = "Codes extracted", body = ExtractionResponse),
        (status = 422, description = "Text empty or too long", body = ExtractionResponse),
        (status = 502, description = "Model reply unusable", body = ExtractionResponse),
        (status = 504, description = "Model call timed out", body = ExtractionResponse)
    )
)]
pub async fn extract(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> (StatusCode, Json<ExtractionResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = ApiError::from(rejection);
            return (
                err.status(),
                Json(ExtractionResponse::failure(err.to_string())),
            );
        }
    };

    let start = Instant::now();
    let outcome = state.pipeline.extract(request.into_note()).await;
    let (status, response) = ExtractionResponse::from_outcome(outcome);

    info!(
        subsystem = "api",
        component = "extraction",
        op = "extract",
        note_id = ?response.note_id,
        success = response.success,
        status = status.as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Extraction request handled"
    );
    (status, Json(response))
}

/// Extract codes from several notes concurrently.
#[utoipa::path(
    post,
    path = "/api/v1/extract/batch",
    tag = "Extraction",
    request_body = BatchExtractRequest,
    responses(
        (status = 200, description = "Per-item results in input order", body = [ExtractionResponse]),
        (status = 422, description = "Batch larger than MAX_BATCH_SIZE", body = ErrorEnvelope)
    )
)]
pub async fn extract_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchExtractRequest>, JsonRejection>,
) -> Result<Json<Vec<ExtractionResponse>>, ApiError> {
    let Json(request) = payload?;

    let source = request.source.filter(|s| !s.trim().is_empty());
    let notes = request
        .texts
        .into_iter()
        .map(|text| {
            let note = NewNote::new(text);
            match &source {
                Some(source) => note.with_source(source.trim()),
                None => note,
            }
        })
        .collect::<Vec<_>>();
    let count = notes.len();

    let start = Instant::now();
    let outcomes = state.pipeline.extract_batch(notes).await?;
    let responses: Vec<ExtractionResponse> = outcomes
        .into_iter()
        .map(|o| ExtractionResponse::from_outcome(o).1)
        .collect();

    info!(
        subsystem = "api",
        component = "extraction",
        op = "extract_batch",
        result_count = count,
        succeeded = responses.iter().filter(|r| r.success).count(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Batch extraction handled"
    );
    Ok(Json(responses))
}
