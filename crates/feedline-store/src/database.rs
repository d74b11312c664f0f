//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] behind a mutex and
//! guarantees that migrations are run before any other operation. It also
//! owns the sender half of the change feed that every write publishes to.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use directories::ProjectDirs;
use feedline_shared::realtime::ChangeEvent;
use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Capacity of the in-process change feed.
const CHANGE_FEED_CAPACITY: usize = 256;

/// Wrapper around a [`rusqlite::Connection`] plus the local change feed.
pub struct Database {
    conn: Mutex<Connection>,
    pub(crate) changes: broadcast::Sender<ChangeEvent>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/feedline/feedline.db`
    /// - macOS:   `~/Library/Application Support/com.feedline.feedline/feedline.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\feedline\feedline\data\feedline.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "feedline", "feedline").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("feedline.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    ///
    /// This is useful for tests and for pointing the client at a scratch file.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&conn)?;

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    /// Lock and return the underlying connection.
    ///
    /// Callers should prefer the typed helpers, but direct access is
    /// occasionally needed for ad-hoc queries.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn()
            .ok()
            .and_then(|c| c.path().map(PathBuf::from))
    }
}

/// Current time at the precision timestamps are stored with.
pub(crate) fn now() -> DateTime<Utc> {
    stored_precision(Utc::now())
}

/// Drop sub-microsecond digits so a value reads back exactly as written.
pub(crate) fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so that text ordering equals time ordering.
pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// `?1, ?2, ... ?n` for an `IN (...)` clause.
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert!(db.path().is_some());
    }

    #[test]
    fn timestamps_sort_as_text() {
        let a = DateTime::parse_from_rfc3339("2024-01-01T00:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = DateTime::parse_from_rfc3339("2024-01-01T00:00:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(ts(&b) < ts(&a));
        assert_eq!(ts(&a), "2024-01-01T00:00:00.500000Z");
    }

    #[test]
    fn placeholder_list() {
        assert_eq!(placeholders(3), "?1, ?2, ?3");
    }
}
