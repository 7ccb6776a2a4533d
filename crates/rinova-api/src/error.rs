//! HTTP error mapping.
//!
//! Every non-extraction failure is answered with the envelope
//! `{"success": false, "data": null, "error": {"code", "message", "timestamp"}}`.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use rinova_core::Error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    GatewayTimeout(String),
    #[error(transparent)]
    Internal(Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a request-decoding failure onto the API taxonomy.
    fn from_rejection(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNPROCESSABLE_ENTITY => ApiError::Unprocessable(message),
            _ => ApiError::BadRequest(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidId(_) => ApiError::BadRequest(err.to_string()),
            Error::NotFound(_) | Error::NoteNotFound(_) => ApiError::NotFound(err.to_string()),
            Error::InvalidInput(_) => ApiError::Unprocessable(err.to_string()),
            Error::Conflict(_) => ApiError::Conflict(err.to_string()),
            Error::Timeout(_) => ApiError::GatewayTimeout(err.to_string()),
            Error::Inference(_) | Error::InvalidFormat(_) => ApiError::BadGateway(err.to_string()),
            other => ApiError::Internal(other),
        }
    }
}

/// Error detail inside the failure envelope.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorDetail {
    /// HTTP status code.
    pub code: u16,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Failure envelope returned by every non-extraction endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorEnvelope {
    pub success: bool,
    #[schema(value_type = Option<Object>)]
    pub data: Option<serde_json::Value>,
    pub error: ErrorDetail,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Internal(ref err) = self {
            error!(subsystem = "api", error = %err, "Request failed");
        }

        let body = ErrorEnvelope {
            success: false,
            data: None,
            error: ErrorDetail {
                code: status.as_u16(),
                message: self.to_string(),
                timestamp: Utc::now(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::InvalidInput("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::InvalidId("x".into()), StatusCode::BAD_REQUEST),
            (Error::NoteNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::Conflict("x".into()), StatusCode::CONFLICT),
            (Error::Timeout(30), StatusCode::GATEWAY_TIMEOUT),
            (Error::Inference("x".into()), StatusCode::BAD_GATEWAY),
            (Error::InvalidFormat("x".into()), StatusCode::BAD_GATEWAY),
            (Error::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_message_keeps_core_text() {
        let err = ApiError::from(Error::Timeout(30));
        assert_eq!(err.to_string(), "Timed out after 30s");
    }
}
