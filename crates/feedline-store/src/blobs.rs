//! Local object upload service.
//!
//! Mirrors the hosted three-step handshake: a one-shot upload target, a raw
//! byte write that yields a storage id (the BLAKE3 hash of the bytes), and a
//! lookup that turns the storage id into a durable URL.

use feedline_shared::types::StorageId;
use rusqlite::params;
use uuid::Uuid;

use crate::database::{now, ts, Database};
use crate::error::{map_read_err, Result, StoreError};

const UPLOAD_URL_PREFIX: &str = "local://upload/";
const BLOB_URL_PREFIX: &str = "local://blob/";

impl Database {
    /// Hand out a single-use write target.
    pub fn open_upload_slot(&self) -> Result<String> {
        let id = Uuid::new_v4();
        self.conn()?.execute(
            "INSERT INTO upload_slots (id, used, created_at) VALUES (?1, 0, ?2)",
            params![id.to_string(), ts(&now())],
        )?;
        Ok(format!("{UPLOAD_URL_PREFIX}{id}"))
    }

    /// Write bytes to a target from [`open_upload_slot`](Self::open_upload_slot).
    pub fn store_blob(&self, upload_url: &str, data: &[u8], content_type: &str) -> Result<StorageId> {
        let slot = upload_url
            .strip_prefix(UPLOAD_URL_PREFIX)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| StoreError::UploadTarget(upload_url.to_string()))?;

        if data.is_empty() {
            return Err(StoreError::UploadTarget("empty upload".into()));
        }

        let claimed = self.conn()?.execute(
            "UPDATE upload_slots SET used = 1 WHERE id = ?1 AND used = 0",
            params![slot.to_string()],
        )?;
        if claimed == 0 {
            return Err(StoreError::UploadTarget(upload_url.to_string()));
        }

        let storage_id = StorageId(blake3::hash(data).to_hex().to_string());

        // identical bytes share one row
        self.conn()?.execute(
            "INSERT OR IGNORE INTO blobs (storage_id, content_type, size, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                storage_id.0,
                content_type,
                data.len() as i64,
                data,
                ts(&now())
            ],
        )?;

        tracing::debug!(storage_id = %storage_id, size = data.len(), "blob stored");
        Ok(storage_id)
    }

    /// Durable URL for a stored blob.
    pub fn blob_url(&self, storage_id: &StorageId) -> Result<String> {
        let exists: u32 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM blobs WHERE storage_id = ?1",
            params![storage_id.0],
            |row| row.get(0),
        )?;

        if exists == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(format!("{BLOB_URL_PREFIX}{storage_id}"))
    }

    /// Bytes and content type behind a `local://blob/...` URL.
    pub fn read_blob(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let storage_id = url.strip_prefix(BLOB_URL_PREFIX).ok_or(StoreError::NotFound)?;

        self.conn()?
            .query_row(
                "SELECT data, content_type FROM blobs WHERE storage_id = ?1",
                params![storage_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(map_read_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("blobs.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn full_handshake() {
        let (db, _dir) = test_db();
        let target = db.open_upload_slot().unwrap();
        let id = db.store_blob(&target, b"jpeg-bytes", "image/jpeg").unwrap();
        let url = db.blob_url(&id).unwrap();

        assert!(url.starts_with("local://blob/"));
        let (data, content_type) = db.read_blob(&url).unwrap();
        assert_eq!(data, b"jpeg-bytes");
        assert_eq!(content_type, "image/jpeg");
    }

    #[test]
    fn upload_target_is_single_use() {
        let (db, _dir) = test_db();
        let target = db.open_upload_slot().unwrap();
        db.store_blob(&target, b"one", "image/png").unwrap();
        assert!(matches!(
            db.store_blob(&target, b"two", "image/png"),
            Err(StoreError::UploadTarget(_))
        ));
    }

    #[test]
    fn unknown_target_and_id_rejected() {
        let (db, _dir) = test_db();
        assert!(db
            .store_blob("local://upload/not-a-uuid", b"x", "image/png")
            .is_err());
        assert!(matches!(
            db.blob_url(&StorageId("deadbeef".into())),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn empty_upload_rejected() {
        let (db, _dir) = test_db();
        let target = db.open_upload_slot().unwrap();
        assert!(db.store_blob(&target, b"", "image/png").is_err());
    }
}
