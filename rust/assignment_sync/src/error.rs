//! Error types for the assignment engine and its transport.
//!
//! Transport errors keep the HTTP status distinguishable so bulk operations
//! can tell a conflict-class failure (409 on add, 404 on remove) apart from a
//! hard failure.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by an [`AssignmentTransport`](crate::transport::AssignmentTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The effect already exists on the server (HTTP 409).
    #[error("Conflict (HTTP 409): {message}")]
    Conflict { message: String },

    /// The target does not exist on the server (HTTP 404).
    #[error("Not found (HTTP 404): {message}")]
    NotFound { message: String },

    /// Any other non-success status.
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request did not settle within the configured operation timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP client error.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or malformed response from server.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Map an HTTP status and response body to a transport error.
    ///
    /// When the body is a JSON object carrying a `message` (or `error`) string,
    /// that string becomes the error message; otherwise the raw body is kept.
    pub fn from_status(status: u16, body: String) -> Self {
        let message = extract_message(&body).unwrap_or(body);
        match status {
            404 => Self::NotFound { message },
            409 => Self::Conflict { message },
            _ => Self::Rejected { status, message },
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Conflict { .. } => Some(409),
            Self::NotFound { .. } => Some(404),
            Self::Rejected { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Timeout(_) | Self::Json(_) | Self::InvalidResponse(_) => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The message supplied by the server, if it sent a non-empty one.
    ///
    /// Used for user-facing notifications; local failures (timeouts, client
    /// errors, decoding) have no server message.
    pub fn server_message(&self) -> Option<&str> {
        let message = match self {
            Self::Conflict { message }
            | Self::NotFound { message }
            | Self::Rejected { message, .. } => message.trim(),
            _ => return None,
        };
        if message.is_empty() {
            None
        } else {
            Some(message)
        }
    }

    /// Check if error is transient and a manual retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Http(_) => true,
            Self::Rejected { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Conflict { .. }
            | Self::NotFound { .. }
            | Self::Json(_)
            | Self::InvalidResponse(_) => false,
        }
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Errors loading an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_409_maps_to_conflict() {
        let err = TransportError::from_status(409, "already exists".to_string());
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.server_message(), Some("already exists"));
    }

    #[test]
    fn test_404_maps_to_not_found() {
        let err = TransportError::from_status(404, String::new());
        assert!(err.is_not_found());
        assert!(!err.is_transient());
        assert_eq!(err.server_message(), None);
    }

    #[test]
    fn test_json_body_message_is_extracted() {
        let body = r#"{"status":500,"message":"Database unavailable"}"#.to_string();
        let err = TransportError::from_status(500, body);
        assert!(matches!(err, TransportError::Rejected { status: 500, .. }));
        assert_eq!(err.server_message(), Some("Database unavailable"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_client_errors_are_not_transient() {
        let err = TransportError::from_status(400, "bad ids".to_string());
        assert!(!err.is_transient());
        assert!(!err.is_conflict());
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_timeout_has_no_server_message() {
        let err = TransportError::Timeout(Duration::from_secs(30));
        assert_eq!(err.server_message(), None);
        assert_eq!(err.status(), None);
        assert!(err.is_transient());
    }
}
