//! CRUD operations for [`Post`] records.

use feedline_shared::models::{NewPost, Post};
use feedline_shared::realtime::{ChangeKind, Table};
use feedline_shared::types::{PostId, UserId};
use rusqlite::params;

use crate::database::{now, parse_ts, parse_uuid, ts, Database};
use crate::error::{map_read_err, map_write_err, Result};

const POST_COLUMNS: &str = "id, user_id, text, image_url, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub fn create_post(&self, new_post: &NewPost) -> Result<Post> {
        let post = Post {
            id: PostId::new(),
            user_id: Some(new_post.user_id),
            text: new_post.text.clone(),
            image_url: new_post.image_url.clone(),
            created_at: now(),
        };

        self.conn()?
            .execute(
                "INSERT INTO posts (id, user_id, text, image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    post.id.to_string(),
                    post.user_id.map(|u| u.to_string()),
                    post.text,
                    post.image_url,
                    ts(&post.created_at),
                ],
            )
            .map_err(map_write_err)?;

        self.publish(Table::Posts, ChangeKind::Insert, Some(&post), None)?;
        Ok(post)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Every post, newest first.
    pub fn list_all_posts(&self) -> Result<Vec<Post>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map([], row_to_post)?;

        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }

    pub fn list_posts_for_user(&self, user_id: UserId) -> Result<Vec<Post>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_post)?;

        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }

    pub fn get_post(&self, id: PostId) -> Result<Post> {
        self.conn()?
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id.to_string()],
                row_to_post,
            )
            .map_err(map_read_err)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Owner-scoped delete; someone else's post is left untouched.
    pub fn remove_post(&self, id: PostId, owner: UserId) -> Result<bool> {
        let existing = match self.get_post(id) {
            Ok(post) if post.user_id == Some(owner) => post,
            Ok(_) | Err(crate::StoreError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };

        let affected = self.conn()?.execute(
            "DELETE FROM posts WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), owner.to_string()],
        )?;

        if affected > 0 {
            self.publish(Table::Posts, ChangeKind::Delete, None, Some(&existing))?;
        }
        Ok(affected > 0)
    }
}

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    let id_str: String = row.get(0)?;
    let user_str: Option<String> = row.get(1)?;
    let text: String = row.get(2)?;
    let image_url: Option<String> = row.get(3)?;
    let created_str: String = row.get(4)?;

    let user_id = match user_str {
        Some(s) => Some(UserId(parse_uuid(1, &s)?)),
        None => None,
    };

    Ok(Post {
        id: PostId(parse_uuid(0, &id_str)?),
        user_id,
        text,
        image_url,
        created_at: parse_ts(4, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("posts.db")).unwrap();
        (db, dir)
    }

    fn new_post(user_id: UserId, text: &str) -> NewPost {
        NewPost {
            user_id,
            text: text.into(),
            image_url: None,
        }
    }

    #[test]
    fn newest_first() {
        let (db, _dir) = test_db();
        let user = UserId::new();
        let first = db.create_post(&new_post(user, "first")).unwrap();
        let second = db.create_post(&new_post(user, "second")).unwrap();

        let posts = db.list_all_posts().unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, second.id);
        assert_eq!(posts[1].id, first.id);
    }

    #[test]
    fn stored_post_reads_back_equal() {
        let (db, _dir) = test_db();
        let created = db
            .create_post(&NewPost {
                user_id: UserId::new(),
                text: "with image".into(),
                image_url: Some("https://cdn/x.jpg".into()),
            })
            .unwrap();
        assert_eq!(db.get_post(created.id).unwrap(), created);
    }

    #[test]
    fn only_owner_can_delete() {
        let (db, _dir) = test_db();
        let owner = UserId::new();
        let post = db.create_post(&new_post(owner, "mine")).unwrap();

        assert!(!db.remove_post(post.id, UserId::new()).unwrap());
        assert!(db.get_post(post.id).is_ok());

        assert!(db.remove_post(post.id, owner).unwrap());
        assert!(matches!(
            db.get_post(post.id),
            Err(crate::StoreError::NotFound)
        ));
    }

    #[test]
    fn posts_for_user_filters_author() {
        let (db, _dir) = test_db();
        let a = UserId::new();
        let b = UserId::new();
        db.create_post(&new_post(a, "a1")).unwrap();
        db.create_post(&new_post(b, "b1")).unwrap();
        db.create_post(&new_post(a, "a2")).unwrap();

        let posts = db.list_posts_for_user(a).unwrap();
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|p| p.user_id == Some(a)));
        assert_eq!(posts[0].text, "a2");
    }
}
