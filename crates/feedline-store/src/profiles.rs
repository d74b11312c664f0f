//! Profile rows: fetch, create-if-missing support and allow-listed updates.

use feedline_shared::models::{Profile, ProfilePatch};
use feedline_shared::realtime::{ChangeKind, Table};
use feedline_shared::types::UserId;
use rusqlite::{params, params_from_iter};

use crate::database::{now, parse_ts, parse_uuid, placeholders, stored_precision, ts, Database};
use crate::error::{map_read_err, map_write_err, Result};

const PROFILE_COLUMNS: &str =
    "id, username, full_name, name, bio, avatar_url, cover_url, dark_mode, created_at, updated_at";

impl Database {
    /// Insert a profile. A second insert for the same id is a [`Conflict`](crate::StoreError::Conflict).
    pub fn create_profile(&self, profile: &Profile) -> Result<Profile> {
        let created_at = profile.created_at.map(stored_precision).unwrap_or_else(now);
        let updated_at = profile.updated_at.map(stored_precision).unwrap_or(created_at);
        let stored = Profile {
            created_at: Some(created_at),
            updated_at: Some(updated_at),
            ..profile.clone()
        };

        self.conn()?
            .execute(
                &format!(
                    "INSERT INTO profiles ({PROFILE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    stored.id.to_string(),
                    stored.username,
                    stored.full_name,
                    stored.name,
                    stored.bio,
                    stored.avatar_url,
                    stored.cover_url,
                    stored.dark_mode as i32,
                    ts(&created_at),
                    ts(&updated_at),
                ],
            )
            .map_err(map_write_err)?;

        self.publish(Table::Profiles, ChangeKind::Insert, Some(&stored), None)?;
        Ok(stored)
    }

    pub fn find_profile(&self, id: UserId) -> Result<Profile> {
        self.conn()?
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                params![id.to_string()],
                row_to_profile,
            )
            .map_err(map_read_err)
    }

    pub fn find_profiles(&self, ids: &[UserId]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id IN ({})",
            placeholders(ids.len())
        ))?;

        let rows = stmt.query_map(
            params_from_iter(ids.iter().map(|id| id.to_string())),
            row_to_profile,
        )?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }

    /// Apply an allow-listed patch. Returns whether a row was updated.
    pub fn patch_profile(&self, id: UserId, patch: &ProfilePatch) -> Result<bool> {
        let mut profile = match self.find_profile(id) {
            Ok(p) => p,
            Err(crate::StoreError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };
        let old = profile.clone();

        patch.apply(&mut profile);
        let updated_at = patch.updated_at.map(stored_precision).unwrap_or_else(now);
        profile.updated_at = Some(updated_at);

        let affected = self.conn()?.execute(
            "UPDATE profiles SET username = ?2, full_name = ?3, name = ?4, bio = ?5,
                 avatar_url = ?6, cover_url = ?7, dark_mode = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                id.to_string(),
                profile.username,
                profile.full_name,
                profile.name,
                profile.bio,
                profile.avatar_url,
                profile.cover_url,
                profile.dark_mode as i32,
                ts(&updated_at),
            ],
        )?;

        if affected > 0 {
            self.publish(Table::Profiles, ChangeKind::Update, Some(&profile), Some(&old))?;
        }
        Ok(affected > 0)
    }

    /// Number of profile rows for `id` (0 or 1).
    pub fn profile_row_count(&self, id: UserId) -> Result<u32> {
        Ok(self.conn()?.query_row(
            "SELECT COUNT(*) FROM profiles WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    let id_str: String = row.get(0)?;
    let dark_mode: i32 = row.get(7)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    Ok(Profile {
        id: UserId(parse_uuid(0, &id_str)?),
        username: row.get(1)?,
        full_name: row.get(2)?,
        name: row.get(3)?,
        bio: row.get(4)?,
        avatar_url: row.get(5)?,
        cover_url: row.get(6)?,
        dark_mode: dark_mode != 0,
        created_at: Some(parse_ts(8, &created_str)?),
        updated_at: Some(parse_ts(9, &updated_str)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("profiles.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn missing_profile_is_not_found() {
        let (db, _dir) = test_db();
        assert!(matches!(
            db.find_profile(UserId::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn returned_profile_matches_stored_row() {
        let (db, _dir) = test_db();
        let id = UserId::new();
        let at = chrono::DateTime::parse_from_rfc3339("2024-05-01T12:00:00.123456789Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let created = db
            .create_profile(&Profile {
                created_at: Some(at),
                updated_at: Some(at),
                ..Profile::placeholder(id)
            })
            .unwrap();

        assert_eq!(created, db.find_profile(id).unwrap());

        let mut rx = db.changes.subscribe();
        let patch = ProfilePatch {
            bio: Some(Some("hi".into())),
            ..Default::default()
        }
        .touched(at);
        db.patch_profile(id, &patch).unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.decode::<Profile>().unwrap(), db.find_profile(id).unwrap());
    }

    #[test]
    fn second_insert_conflicts() {
        let (db, _dir) = test_db();
        let id = UserId::new();
        db.create_profile(&Profile::placeholder(id)).unwrap();

        let again = db.create_profile(&Profile::placeholder(id));
        assert!(matches!(again, Err(StoreError::Conflict(_))));
        assert_eq!(db.profile_row_count(id).unwrap(), 1);
    }

    #[test]
    fn patch_updates_allowed_columns() {
        let (db, _dir) = test_db();
        let id = UserId::new();
        let created = db.create_profile(&Profile::placeholder(id)).unwrap();

        let patch = ProfilePatch {
            full_name: Some(Some("Ada Lovelace".into())),
            dark_mode: Some(true),
            ..Default::default()
        };
        assert!(db.patch_profile(id, &patch).unwrap());

        let stored = db.find_profile(id).unwrap();
        assert_eq!(stored.full_name.as_deref(), Some("Ada Lovelace"));
        assert!(stored.dark_mode);
        assert_eq!(stored.username, created.username);
        assert_eq!(stored.created_at, created.created_at);
    }

    #[test]
    fn patch_of_missing_profile_updates_nothing() {
        let (db, _dir) = test_db();
        let patch = ProfilePatch {
            bio: Some(Some("hi".into())),
            ..Default::default()
        };
        assert!(!db.patch_profile(UserId::new(), &patch).unwrap());
    }

    #[test]
    fn batch_lookup() {
        let (db, _dir) = test_db();
        let a = UserId::new();
        let b = UserId::new();
        db.create_profile(&Profile::placeholder(a)).unwrap();
        db.create_profile(&Profile::placeholder(b)).unwrap();

        let found = db.find_profiles(&[a, UserId::new()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a);
        assert!(db.find_profiles(&[]).unwrap().is_empty());
    }
}
