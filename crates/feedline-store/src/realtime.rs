//! In-process change feed.
//!
//! Writes publish a [`ChangeEvent`] on a broadcast channel; each
//! subscription gets a forwarding task that applies its filter and stops
//! when the subscriber drops its end.

use feedline_shared::constants::SUBSCRIPTION_BUFFER;
use feedline_shared::realtime::{ChangeEvent, ChangeFilter, ChangeKind, Subscription, Table};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Publish a change. Having no subscribers is not an error.
    pub(crate) fn publish<T: Serialize>(
        &self,
        table: Table,
        kind: ChangeKind,
        record: Option<&T>,
        old_record: Option<&T>,
    ) -> Result<()> {
        let event = ChangeEvent {
            table,
            kind,
            record: record
                .map(serde_json::to_value)
                .transpose()?
                .unwrap_or(serde_json::Value::Null),
            old_record: old_record
                .map(serde_json::to_value)
                .transpose()?
                .unwrap_or(serde_json::Value::Null),
        };

        let receivers = self.changes.send(event).unwrap_or(0);
        debug!(table = %table, kind = kind.as_str(), receivers, "change published");
        Ok(())
    }

    /// Subscribe to changes matching `filter`.
    ///
    /// Must be called inside a Tokio runtime. Events published after this
    /// call returns are never missed.
    pub fn watch(&self, filter: ChangeFilter) -> Subscription {
        let mut rx = self.changes.subscribe();
        let (tx, out) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task_filter = filter.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    received = rx.recv() => match received {
                        Ok(event) => {
                            if task_filter.matches(&event) && tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(table = %task_filter.table, skipped, "change feed lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(table = %task_filter.table, "subscription closed");
        });

        Subscription::new(filter, out)
    }
}

#[cfg(test)]
mod tests {
    use feedline_shared::models::{Like, NewPost};
    use feedline_shared::types::UserId;

    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("rt.db")).unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn subscriber_sees_matching_insert() {
        let (db, _dir) = test_db();
        let mut sub = db.watch(ChangeFilter::table(Table::Posts).on(ChangeKind::Insert));

        let post = db
            .create_post(&NewPost {
                user_id: UserId::new(),
                text: "hello".into(),
                image_url: None,
            })
            .unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.record["id"], post.id.to_string());
    }

    #[tokio::test]
    async fn row_filter_skips_other_rows() {
        let (db, _dir) = test_db();
        let author = UserId::new();
        let other = UserId::new();
        let mut sub = db.watch(ChangeFilter::table(Table::Posts).where_eq("user_id", author));

        db.create_post(&NewPost {
            user_id: other,
            text: "not mine".into(),
            image_url: None,
        })
        .unwrap();
        let mine = db
            .create_post(&NewPost {
                user_id: author,
                text: "mine".into(),
                image_url: None,
            })
            .unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.record["id"], mine.id.to_string());
    }

    #[tokio::test]
    async fn like_delete_reaches_any_kind_subscriber() {
        let (db, _dir) = test_db();
        let user = UserId::new();
        let post = db
            .create_post(&NewPost {
                user_id: user,
                text: "x".into(),
                image_url: None,
            })
            .unwrap();
        let like = Like {
            post_id: post.id,
            user_id: user,
        };
        db.add_like(&like).unwrap();

        let mut sub = db.watch(ChangeFilter::table(Table::Likes));
        assert!(db.remove_like(&like).unwrap());

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.old_record["post_id"], post.id.to_string());
    }
}
