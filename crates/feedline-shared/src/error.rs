use thiserror::Error;

/// Errors every service trait reports, whichever backend sits behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A single-row fetch matched nothing.
    #[error("Record not found")]
    NotFound,

    /// A unique constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The call needs a signed-in session.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Sign-in / sign-up rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The remote service answered with an error status.
    #[error("Remote service error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The request never completed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Local storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::InvalidResponse(e.to_string())
    }
}

/// Convenience alias used by the service traits.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
