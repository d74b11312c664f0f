use feedline_shared::ServiceError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// A unique constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Sign-up / sign-in rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Password hashing failure.
    #[error("Password hashing error: {0}")]
    Password(#[from] bcrypt::BcryptError),

    /// The upload target is unknown or already used.
    #[error("Invalid upload target: {0}")]
    UploadTarget(String),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("Connection lock poisoned")]
    LockPoisoned,

    /// JSON encoding of a change event.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Auth(msg) => ServiceError::Auth(msg),
            StoreError::UploadTarget(msg) => ServiceError::Api {
                status: 400,
                message: msg,
            },
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

/// Map a failed write, turning unique-constraint violations into [`StoreError::Conflict`].
pub(crate) fn map_write_err(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::Conflict(msg.clone().unwrap_or_else(|| err.to_string()))
        }
        _ => StoreError::Sqlite(e),
    }
}

/// Map a single-row read, turning "no rows" into [`StoreError::NotFound`].
pub(crate) fn map_read_err(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}
