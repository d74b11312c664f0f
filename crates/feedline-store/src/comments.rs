use feedline_shared::models::{Comment, NewComment};
use feedline_shared::realtime::{ChangeKind, Table};
use feedline_shared::types::{CommentId, PostId, UserId};
use rusqlite::{params, params_from_iter};

use crate::database::{now, parse_ts, parse_uuid, placeholders, ts, Database};
use crate::error::{map_write_err, Result};
use crate::likes::row_to_post_id;

impl Database {
    pub fn create_comment(&self, new_comment: &NewComment) -> Result<Comment> {
        let comment = Comment {
            id: CommentId::new(),
            post_id: new_comment.post_id,
            user_id: new_comment.user_id,
            text: new_comment.text.clone(),
            created_at: now(),
        };

        self.conn()?
            .execute(
                "INSERT INTO comments (id, post_id, user_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    comment.id.to_string(),
                    comment.post_id.to_string(),
                    comment.user_id.to_string(),
                    comment.text,
                    ts(&comment.created_at),
                ],
            )
            .map_err(map_write_err)?;

        self.publish(Table::Comments, ChangeKind::Insert, Some(&comment), None)?;
        Ok(comment)
    }

    /// A post's comments, oldest first.
    pub fn comments_on_post(&self, post_id: PostId) -> Result<Vec<Comment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, post_id, user_id, text, created_at
             FROM comments
             WHERE post_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![post_id.to_string()], row_to_comment)?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    /// One entry per comment row on any of `post_ids`.
    pub fn comment_rows_for_posts(&self, post_ids: &[PostId]) -> Result<Vec<PostId>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT post_id FROM comments WHERE post_id IN ({})",
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
}

fn row_to_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    let id_str: String = row.get(0)?;
    let post_str: String = row.get(1)?;
    let user_str: String = row.get(2)?;
    let text: String = row.get(3)?;
    let ts_str: String = row.get(4)?;

    Ok(Comment {
        id: CommentId(parse_uuid(0, &id_str)?),
        post_id: PostId(parse_uuid(1, &post_str)?),
        user_id: UserId(parse_uuid(2, &user_str)?),
        text,
        created_at: parse_ts(4, &ts_str)?,
    })
}
