use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Write targets handed out by the local upload service
CREATE TABLE IF NOT EXISTS upload_slots (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    used       INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- Content-addressed image bytes
CREATE TABLE IF NOT EXISTS blobs (
    storage_id   TEXT PRIMARY KEY NOT NULL, -- BLAKE3 hex
    content_type TEXT NOT NULL,
    size         INTEGER NOT NULL,
    data         BLOB NOT NULL,
    created_at   TEXT NOT NULL
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
