//! Network error types.

use feedline_shared::ServiceError;
use thiserror::Error;

/// Errors raised talking to the hosted services.
#[derive(Error, Debug)]
pub enum NetError {
    /// HTTP transport or body decoding failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A base URL could not be parsed or joined.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The service answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Sign-in / sign-up rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A single-row request matched nothing.
    #[error("Record not found")]
    NotFound,

    /// The realtime channel was refused or could not be set up.
    #[error("Realtime channel error: {0}")]
    Realtime(String),

    /// The response parsed but did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type alias using NetError.
pub type NetResult<T> = Result<T, NetError>;

impl From<NetError> for ServiceError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::NotFound => ServiceError::NotFound,
            NetError::Auth(msg) => ServiceError::Auth(msg),
            NetError::Api { status: 409, message } => ServiceError::Conflict(message),
            NetError::Api { status: 401, .. } => ServiceError::Unauthenticated,
            NetError::Api { status, message } => ServiceError::Api { status, message },
            NetError::Http(e) if e.is_decode() => ServiceError::InvalidResponse(e.to_string()),
            NetError::Http(e) => ServiceError::Transport(e.to_string()),
            NetError::WebSocket(e) => ServiceError::Transport(e.to_string()),
            NetError::Url(e) => ServiceError::Transport(e.to_string()),
            NetError::Realtime(msg) => ServiceError::Transport(msg),
            NetError::Json(e) => ServiceError::InvalidResponse(e.to_string()),
            NetError::InvalidResponse(msg) => ServiceError::InvalidResponse(msg),
        }
    }
}

/// Pull a human-readable message out of an error body.
///
/// The data service uses `message`, the auth service `msg` or
/// `error_description`; anything else falls back to the raw body.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error_description", "errorMessage", "error"]
                .iter()
                .find_map(|key| v.get(key).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_status_maps_to_conflict() {
        let e = NetError::Api {
            status: 409,
            message: "duplicate key value violates unique constraint".into(),
        };
        assert!(matches!(ServiceError::from(e), ServiceError::Conflict(_)));
    }

    #[test]
    fn other_statuses_stay_api_errors() {
        let e = NetError::Api {
            status: 404,
            message: "relation \"public.likes\" does not exist".into(),
        };
        assert!(matches!(
            ServiceError::from(e),
            ServiceError::Api { status: 404, .. }
        ));
    }

    #[test]
    fn error_message_prefers_known_keys() {
        assert_eq!(
            error_message(r#"{"code":"23505","message":"duplicate key"}"#),
            "duplicate key"
        );
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(error_message("  gateway timeout \n"), "gateway timeout");
    }
}
