use feedline_shared::models::Like;
use feedline_shared::realtime::{ChangeKind, Table};
use feedline_shared::types::{PostId, UserId};
use rusqlite::{params, params_from_iter};

use crate::database::{now, parse_uuid, placeholders, ts, Database};
use crate::error::{map_write_err, Result};

impl Database {
    /// Insert a like. The unique (post, user) index turns a repeat into a
    /// [`Conflict`](crate::StoreError::Conflict).
    pub fn add_like(&self, like: &Like) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![
                    like.post_id.to_string(),
                    like.user_id.to_string(),
                    ts(&now())
                ],
            )
            .map_err(map_write_err)?;

        self.publish(Table::Likes, ChangeKind::Insert, Some(like), None)?;
        Ok(())
    }

    pub fn remove_like(&self, like: &Like) -> Result<bool> {
        let affected = self.conn()?.execute(
            "DELETE FROM likes WHERE post_id = ?1 AND user_id = ?2",
            params![like.post_id.to_string(), like.user_id.to_string()],
        )?;

        if affected > 0 {
            self.publish(Table::Likes, ChangeKind::Delete, None, Some(like))?;
        }
        Ok(affected > 0)
    }

    /// Posts `user_id` has liked.
    pub fn liked_posts_for_user(&self, user_id: UserId) -> Result<Vec<PostId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT post_id FROM likes WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_post_id)?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// One entry per like row on any of `post_ids`.
    pub fn like_rows_for_posts(&self, post_ids: &[PostId]) -> Result<Vec<PostId>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT post_id FROM likes WHERE post_id IN ({})",
            placeholders(post_ids.len())
        ))?;
        let rows = stmt.query_map(
            params_from_iter(post_ids.iter().map(|id| id.to_string())),
            row_to_post_id,
        )?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn count_likes(&self, post_id: PostId) -> Result<u32> {
        Ok(self.conn()?.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
            params![post_id.to_string()],
            |row| row.get(0),
        )?)
    }

    pub fn has_liked(&self, post_id: PostId, user_id: UserId) -> Result<bool> {
        let n: u32 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id = ?1 AND user_id = ?2",
            params![post_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }
}

pub(crate) fn row_to_post_id(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostId> {
    let s: String = row.get(0)?;
    Ok(PostId(parse_uuid(0, &s)?))
}
