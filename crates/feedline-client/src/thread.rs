//! Comment thread for one selected post.
//!
//! Opening a thread loads its comments oldest first and watches the
//! comments table for that post. Posting re-fetches the whole thread rather
//! than appending locally, and bumps the post's cached comment count.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use feedline_shared::display::comment_author_name;
use feedline_shared::models::{Comment, NewComment, Profile};
use feedline_shared::realtime::{ChangeFilter, Subscription, Table};
use feedline_shared::service::DataService;
use feedline_shared::types::{PostId, UserId};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventBus};
use crate::feed::FeedSynchronizer;
use crate::session::SessionStore;

/// A comment with its author's handle and avatar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Default)]
struct ThreadState {
    open: Option<PostId>,
    comments: Vec<ThreadComment>,
}

#[derive(Clone)]
pub struct CommentThread {
    inner: Arc<ThreadInner>,
}

struct ThreadInner {
    data: Arc<dyn DataService>,
    session: SessionStore,
    feed: FeedSynchronizer,
    events: EventBus,
    state: RwLock<ThreadState>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ThreadInner {
    fn drop(&mut self) {
        if let Ok(Some(handle)) = self.watcher.get_mut().map(Option::take) {
            handle.abort();
        }
    }
}

impl CommentThread {
    pub fn new(
        data: Arc<dyn DataService>,
        session: SessionStore,
        feed: FeedSynchronizer,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(ThreadInner {
                data,
                session,
                feed,
                events,
                state: RwLock::new(ThreadState::default()),
                watcher: Mutex::new(None),
            }),
        }
    }

    pub async fn open_post(&self) -> Option<PostId> {
        self.inner.state.read().await.open
    }

    pub async fn comments(&self) -> Vec<ThreadComment> {
        self.inner.state.read().await.comments.clone()
    }

    /// Select `post_id`, load its comments and start watching for changes.
    pub async fn open(&self, post_id: PostId) -> Vec<ThreadComment> {
        {
            let mut state = self.inner.state.write().await;
            state.open = Some(post_id);
            state.comments.clear();
        }

        let filter = ChangeFilter::table(Table::Comments).where_eq("post_id", post_id);
        match self.inner.data.subscribe(filter).await {
            Ok(subscription) => {
                let handle = tokio::spawn(reload_on_change(
                    Arc::downgrade(&self.inner),
                    post_id,
                    subscription,
                ));
                self.replace_watcher(Some(handle));
            }
            Err(e) => {
                warn!(post_id = %post_id, error = %e, "comment realtime unavailable");
                self.replace_watcher(None);
            }
        }

        self.reload(post_id).await
    }

    /// Deselect the thread and stop watching it.
    pub async fn close(&self) {
        self.replace_watcher(None);
        *self.inner.state.write().await = ThreadState::default();
    }

    /// Post a comment on the open thread.
    pub async fn post_comment(&self, text: &str) -> ClientResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyComment);
        }
        let post_id = self.open_post().await.ok_or(ClientError::NoThreadOpen)?;
        let user_id = self.inner.session.require_user()?;

        let comment = self
            .inner
            .data
            .insert_comment(&NewComment {
                post_id,
                user_id,
                text: text.to_string(),
            })
            .await
            .map_err(|e| {
                warn!(post_id = %post_id, error = %e, "failed to post comment");
                ClientError::from(e)
            })?;
        info!(post_id = %post_id, comment_id = %comment.id, "comment posted");

        self.reload(post_id).await;
        self.inner.feed.bump_comment_count(post_id).await;
        Ok(())
    }

    /// Re-fetch the thread. The result is dropped if another post was opened
    /// in the meantime.
    async fn reload(&self, post_id: PostId) -> Vec<ThreadComment> {
        let comments = match self.inner.data.comments_for_post(post_id).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!(post_id = %post_id, error = %e, "failed to load comments");
                Vec::new()
            }
        };
        let enriched = self.enrich(comments).await;

        let mut state = self.inner.state.write().await;
        if state.open != Some(post_id) {
            debug!(post_id = %post_id, "thread closed before comments arrived");
            return Vec::new();
        }
        state.comments = enriched.clone();
        drop(state);

        self.inner.events.emit(ClientEvent::ThreadUpdated { post_id });
        enriched
    }

    async fn enrich(&self, comments: Vec<Comment>) -> Vec<ThreadComment> {
        let mut author_ids: Vec<UserId> = comments.iter().map(|c| c.user_id).collect();
        author_ids.sort();
        author_ids.dedup();

        let profiles: HashMap<UserId, Profile> = if author_ids.is_empty() {
            HashMap::new()
        } else {
            match self.inner.data.profiles_by_ids(&author_ids).await {
                Ok(profiles) => profiles.into_iter().map(|p| (p.id, p)).collect(),
                Err(e) => {
                    warn!(error = %e, "comment authors unavailable");
                    HashMap::new()
                }
            }
        };

        comments
            .into_iter()
            .map(|comment| {
                let profile = profiles.get(&comment.user_id);
                ThreadComment {
                    username: comment_author_name(profile, &comment.user_id),
                    avatar_url: profile.and_then(|p| p.avatar_url.clone()),
                    comment,
                }
            })
            .collect()
    }

    fn replace_watcher(&self, handle: Option<JoinHandle<()>>) {
        if let Ok(mut watcher) = self.inner.watcher.lock() {
            if let Some(previous) = std::mem::replace(&mut *watcher, handle) {
                previous.abort();
            }
        }
    }
}

async fn reload_on_change(thread: Weak<ThreadInner>, post_id: PostId, mut subscription: Subscription) {
    while subscription.recv().await.is_some() {
        let Some(inner) = thread.upgrade() else { break };
        let thread = CommentThread { inner };
        if thread.open_post().await == Some(post_id) {
            thread.reload(post_id).await;
        }
    }
}
