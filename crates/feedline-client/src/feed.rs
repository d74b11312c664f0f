//! Feed synchronizer.
//!
//! A refresh fetches every post newest first and joins in four auxiliary
//! dimensions: author profiles, the signed-in user's likes, like counts and
//! comment counts. Each auxiliary fetch fails on its own: a broken one
//! degrades to empty/zero for that dimension and the refresh carries on.
//! Counts are always recomputed from the like/comment rows.
//!
//! Realtime notifications on posts (insert), likes (any) and comments (any)
//! trigger a full refresh; overlapping refreshes simply overwrite each
//! other, last completion wins.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

use feedline_shared::display::display_name;
use feedline_shared::models::{Like, Post, Profile};
use feedline_shared::realtime::{ChangeFilter, ChangeKind, Subscription, Table};
use feedline_shared::service::DataService;
use feedline_shared::types::{PostId, UserId};
use feedline_shared::ServiceError;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ClientResult;
use crate::events::{ClientEvent, EventBus};
use crate::session::SessionStore;

/// A post joined with its author and derived counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedPost {
    #[serde(flatten)]
    pub post: Post,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub likes_count: u32,
    pub comments_count: u32,
    pub is_liked: bool,
}

impl FeedPost {
    pub fn id(&self) -> PostId {
        self.post.id
    }
}

/// Cheap to clone; clones share the cache and the realtime watchers.
#[derive(Clone)]
pub struct FeedSynchronizer {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    data: Arc<dyn DataService>,
    session: SessionStore,
    events: EventBus,
    posts: RwLock<Vec<FeedPost>>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for FeedInner {
    fn drop(&mut self) {
        if let Ok(watchers) = self.watchers.get_mut() {
            for handle in watchers.drain(..) {
                handle.abort();
            }
        }
    }
}

impl FeedSynchronizer {
    pub fn new(data: Arc<dyn DataService>, session: SessionStore, events: EventBus) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                data,
                session,
                events,
                posts: RwLock::new(Vec::new()),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Snapshot of the cached feed.
    pub async fn posts(&self) -> Vec<FeedPost> {
        self.inner.posts.read().await.clone()
    }

    pub async fn post(&self, post_id: PostId) -> Option<FeedPost> {
        self.inner
            .posts
            .read()
            .await
            .iter()
            .find(|p| p.id() == post_id)
            .cloned()
    }

    /// Re-fetch and re-join the whole feed.
    pub async fn refresh_feed(&self) -> Vec<FeedPost> {
        let inner = &self.inner;
        let posts = match inner.data.list_posts().await {
            Ok(posts) => posts,
            Err(e) => {
                error!(error = %e, "failed to fetch posts");
                Vec::new()
            }
        };

        let post_ids: Vec<PostId> = posts.iter().map(|p| p.id).collect();
        let author_ids: Vec<UserId> = posts
            .iter()
            .filter_map(|p| p.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let viewer = inner.session.user_id();

        let (profiles, liked, like_rows, comment_rows) = tokio::join!(
            self.author_profiles(&author_ids),
            self.liked_by(viewer),
            degrade("like counts", inner.data.like_post_ids(&post_ids)),
            degrade("comment counts", inner.data.comment_post_ids(&post_ids)),
        );
        let likes_count = tally(like_rows);
        let comments_count = tally(comment_rows);

        let feed: Vec<FeedPost> = posts
            .into_iter()
            .map(|post| {
                let profile = post.user_id.and_then(|id| profiles.get(&id));
                FeedPost {
                    author_name: display_name(profile, post.user_id.as_ref()),
                    author_avatar: profile.and_then(|p| p.avatar_url.clone()),
                    likes_count: likes_count.get(&post.id).copied().unwrap_or(0),
                    comments_count: comments_count.get(&post.id).copied().unwrap_or(0),
                    is_liked: liked.contains(&post.id),
                    post,
                }
            })
            .collect();

        debug!(count = feed.len(), "feed refreshed");
        *inner.posts.write().await = feed.clone();
        inner.events.emit(ClientEvent::FeedUpdated);
        feed
    }

    async fn author_profiles(&self, author_ids: &[UserId]) -> HashMap<UserId, Profile> {
        if author_ids.is_empty() {
            return HashMap::new();
        }
        degrade("author profiles", self.inner.data.profiles_by_ids(author_ids))
            .await
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    }

    async fn liked_by(&self, viewer: Option<UserId>) -> HashSet<PostId> {
        match viewer {
            Some(user_id) => degrade("viewer likes", self.inner.data.liked_post_ids(user_id))
                .await
                .into_iter()
                .collect(),
            None => HashSet::new(),
        }
    }

    /// Like or unlike `post_id` for the signed-in user.
    ///
    /// The cache changes only after the remote write succeeds. Failures are
    /// logged and otherwise ignored.
    pub async fn toggle_like(&self, post_id: PostId, was_liked: bool) {
        let Some(user_id) = self.inner.session.user_id() else {
            warn!(post_id = %post_id, "like toggled without a session");
            return;
        };
        let like = Like { post_id, user_id };

        if was_liked {
            match self.inner.data.delete_like(&like).await {
                Ok(removed) => {
                    self.update_post(post_id, |p| {
                        if removed {
                            p.likes_count = p.likes_count.saturating_sub(1);
                        }
                        p.is_liked = false;
                    })
                    .await
                }
                Err(e) => warn!(post_id = %post_id, error = %e, "unlike failed"),
            }
        } else {
            match self.inner.data.insert_like(&like).await {
                Ok(()) => {
                    self.update_post(post_id, |p| {
                        p.likes_count += 1;
                        p.is_liked = true;
                    })
                    .await
                }
                // storage already holds the like
                Err(ServiceError::Conflict(_)) => {
                    self.update_post(post_id, |p| p.is_liked = true).await
                }
                Err(e) => warn!(post_id = %post_id, error = %e, "like failed"),
            }
        }
    }

    /// Count a comment the user just posted without waiting for a refresh.
    pub async fn bump_comment_count(&self, post_id: PostId) {
        self.update_post(post_id, |p| p.comments_count += 1).await;
    }

    /// Drop a deleted post from the cache.
    pub async fn remove_post(&self, post_id: PostId) {
        let removed = {
            let mut posts = self.inner.posts.write().await;
            let before = posts.len();
            posts.retain(|p| p.id() != post_id);
            posts.len() != before
        };
        if removed {
            self.inner.events.emit(ClientEvent::FeedUpdated);
        }
    }

    async fn update_post(&self, post_id: PostId, apply: impl FnOnce(&mut FeedPost)) {
        let updated = {
            let mut posts = self.inner.posts.write().await;
            match posts.iter_mut().find(|p| p.id() == post_id) {
                Some(post) => {
                    apply(post);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.inner.events.emit(ClientEvent::FeedUpdated);
        }
    }

    /// Subscribe to post inserts and any like/comment change; each
    /// notification re-runs [`refresh_feed`](Self::refresh_feed).
    pub async fn start_realtime(&self) -> ClientResult<()> {
        self.stop_realtime();

        let filters = [
            ChangeFilter::table(Table::Posts).on(ChangeKind::Insert),
            ChangeFilter::table(Table::Likes),
            ChangeFilter::table(Table::Comments),
        ];

        let mut handles = Vec::with_capacity(filters.len());
        for filter in filters {
            let subscription = self.inner.data.subscribe(filter).await?;
            handles.push(tokio::spawn(refresh_on_change(
                Arc::downgrade(&self.inner),
                subscription,
            )));
        }

        if let Ok(mut watchers) = self.inner.watchers.lock() {
            watchers.extend(handles);
        }
        info!("feed realtime watchers started");
        Ok(())
    }

    pub fn stop_realtime(&self) {
        if let Ok(mut watchers) = self.inner.watchers.lock() {
            for handle in watchers.drain(..) {
                handle.abort();
            }
        }
    }
}

async fn refresh_on_change(feed: Weak<FeedInner>, mut subscription: Subscription) {
    let table = subscription.filter().table;
    while let Some(event) = subscription.recv().await {
        // the feed was dropped while this watcher slept
        let Some(inner) = feed.upgrade() else { break };
        debug!(table = %table, kind = event.kind.as_str(), "change received, refreshing feed");
        FeedSynchronizer { inner }.refresh_feed().await;
    }
}

/// Await an auxiliary fetch, logging and substituting an empty result on failure.
async fn degrade<T: Default>(
    what: &str,
    fetch: impl std::future::Future<Output = feedline_shared::ServiceResult<T>>,
) -> T {
    match fetch.await {
        Ok(value) => value,
        Err(e) => {
            warn!(dimension = what, error = %e, "auxiliary fetch failed, using empty result");
            T::default()
        }
    }
}

fn tally(rows: Vec<PostId>) -> HashMap<PostId, u32> {
    let mut counts = HashMap::new();
    for post_id in rows {
        *counts.entry(post_id).or_insert(0) += 1;
    }
    counts
}
