//! Error types for the Rinova coding service.

use thiserror::Error;

/// Result type alias using Rinova's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Rinova operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// Identifier could not be parsed
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Extraction payload is not a JSON object
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A single code or gap entry was unusable and has been dropped
    #[error("Malformed entry: {0}")]
    MalformedEntry(String),

    /// Extraction call exceeded its deadline
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Concurrent state change lost the race
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failure came from the upstream text-generation service.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Inference(_) | Error::InvalidFormat(_) | Error::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not expose the configured duration
            Error::Timeout(0)
        } else {
            Error::Inference(e.to_string())
        }
    }
}

impl From<uuid::Error> for Error {
    fn from(e: uuid::Error) -> Self {
        Error::InvalidId(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_note_not_found() {
        let id = Uuid::nil();
        let err = Error::NoteNotFound(id);
        assert_eq!(err.to_string(), format!("Note not found: {}", id));
    }

    #[test]
    fn test_error_display_invalid_id() {
        let err = Error::InvalidId("abc".to_string());
        assert_eq!(err.to_string(), "Invalid id: abc");
    }

    #[test]
    fn test_error_display_invalid_format() {
        let err = Error::InvalidFormat("expected object, got array".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid format: expected object, got array"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = Error::Timeout(30);
        assert_eq!(err.to_string(), "Timed out after 30s");
    }

    #[test]
    fn test_error_display_inference() {
        let err = Error::Inference("model overloaded".to_string());
        assert_eq!(err.to_string(), "Inference error: model overloaded");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("note already in progress".to_string());
        assert_eq!(err.to_string(), "Conflict: note already in progress");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_from_uuid() {
        let uuid_err = Uuid::parse_str("not-a-uuid").unwrap_err();
        let err: Error = uuid_err.into();
        assert!(matches!(err, Error::InvalidId(_)));
    }

    #[test]
    fn test_is_upstream() {
        assert!(Error::Timeout(5).is_upstream());
        assert!(Error::Inference("x".into()).is_upstream());
        assert!(Error::InvalidFormat("x".into()).is_upstream());
        assert!(!Error::NotFound("x".into()).is_upstream());
        assert!(!Error::InvalidInput("x".into()).is_upstream());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
