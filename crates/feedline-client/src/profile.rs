//! Profiles: create-if-missing, allow-listed updates, the profile screen's
//! post list and edit flow, and provisioning on sign-in.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use feedline_shared::models::{Post, Profile, ProfilePatch};
use feedline_shared::realtime::{ChangeFilter, ChangeKind, Subscription, Table};
use feedline_shared::service::{AuthUser, DataService};
use feedline_shared::types::{PostId, UserId};
use feedline_shared::ServiceError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventBus};
use crate::feed::FeedSynchronizer;
use crate::session::SessionStore;
use crate::upload::ImageUploader;

/// What the edit screen submits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileEdit {
    pub full_name: String,
    pub bio: String,
    pub dark_mode: bool,
    /// Local image to upload as the new avatar.
    pub new_avatar: Option<PathBuf>,
    /// Local image to upload as the new cover.
    pub new_cover: Option<PathBuf>,
}

#[derive(Clone)]
pub struct ProfileService {
    inner: Arc<ProfileInner>,
}

struct ProfileInner {
    data: Arc<dyn DataService>,
    session: SessionStore,
    feed: FeedSynchronizer,
    uploader: ImageUploader,
    events: EventBus,
    user_posts: RwLock<Vec<Post>>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for ProfileInner {
    fn drop(&mut self) {
        if let Ok(watchers) = self.watchers.get_mut() {
            for handle in watchers.drain(..) {
                handle.abort();
            }
        }
    }
}

impl ProfileService {
    pub fn new(
        data: Arc<dyn DataService>,
        session: SessionStore,
        feed: FeedSynchronizer,
        uploader: ImageUploader,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(ProfileInner {
                data,
                session,
                feed,
                uploader,
                events,
                user_posts: RwLock::new(Vec::new()),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Fetch a profile, inserting the default record if none exists.
    ///
    /// Store errors other than "not found" yield the default record without
    /// persisting it, so the caller always gets something to render.
    pub async fn get_or_create(&self, user_id: UserId) -> Profile {
        let data = &self.inner.data;
        match data.get_profile(user_id).await {
            Ok(profile) => profile,
            Err(ServiceError::NotFound) => {
                let now = Utc::now();
                let fresh = Profile {
                    created_at: Some(now),
                    updated_at: Some(now),
                    ..Profile::placeholder(user_id)
                };
                match data.insert_profile(&fresh).await {
                    Ok(created) => {
                        info!(user_id = %user_id, "profile created");
                        created
                    }
                    // created concurrently; use the stored row
                    Err(ServiceError::Conflict(_)) => data
                        .get_profile(user_id)
                        .await
                        .unwrap_or_else(|_| Profile::placeholder(user_id)),
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "profile create failed, using default");
                        Profile::placeholder(user_id)
                    }
                }
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "profile fetch failed, using default");
                Profile::placeholder(user_id)
            }
        }
    }

    /// Make sure a freshly signed-in user has a profile row. Failures are
    /// logged, never surfaced.
    pub async fn ensure_profile(&self, user: &AuthUser) -> Option<Profile> {
        let data = &self.inner.data;
        match data.get_profile(user.id).await {
            Ok(profile) => return Some(profile),
            Err(ServiceError::NotFound) => {}
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "profile lookup failed");
                return None;
            }
        }

        let profile = Profile::provisioned(user.id, user.email.as_deref());
        match data.insert_profile(&profile).await {
            Ok(created) => {
                info!(user_id = %user.id, "auto-created profile");
                Some(created)
            }
            Err(ServiceError::Conflict(_)) => data.get_profile(user.id).await.ok(),
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "profile provisioning failed");
                None
            }
        }
    }

    /// Apply an allow-listed update and stamp `updated_at`.
    pub async fn update(&self, user_id: UserId, patch: ProfilePatch) -> ClientResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let patch = patch.touched(Utc::now());
        self.inner
            .data
            .update_profile(user_id, &patch)
            .await
            .map_err(|e| {
                error!(user_id = %user_id, error = %e, "profile update failed");
                ClientError::from(e)
            })?;
        info!(user_id = %user_id, "profile updated");

        if self.inner.session.user_id() == Some(user_id) {
            if let Ok(profile) = self.inner.data.get_profile(user_id).await {
                self.inner.session.set_profile(profile);
            }
        }
        Ok(())
    }

    /// Update from loosely-typed fields. Keys outside the allow-list are
    /// dropped; a wrongly-typed allowed key is an error.
    pub async fn update_fields(&self, user_id: UserId, fields: serde_json::Value) -> ClientResult<()> {
        let patch = ProfilePatch::from_json(fields)
            .map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        self.update(user_id, patch).await
    }

    /// A user's posts, newest first. Empty on failure.
    pub async fn posts_by_user(&self, user_id: UserId) -> Vec<Post> {
        let posts = match self.inner.data.posts_by_user(user_id).await {
            Ok(posts) => posts,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "failed to fetch user posts");
                Vec::new()
            }
        };

        *self.inner.user_posts.write().await = posts.clone();
        self.inner.events.emit(ClientEvent::UserPostsUpdated { user_id });
        posts
    }

    /// The list last fetched by [`posts_by_user`](Self::posts_by_user).
    pub async fn user_posts(&self) -> Vec<Post> {
        self.inner.user_posts.read().await.clone()
    }

    /// Delete one of the signed-in user's posts. Returns false when nothing
    /// was deleted (not the owner, or already gone).
    pub async fn delete_post(&self, post_id: PostId) -> ClientResult<bool> {
        let owner = self.inner.session.require_user()?;

        match self.inner.data.delete_post(post_id, owner).await {
            Ok(true) => {
                info!(post_id = %post_id, "post deleted");
                self.inner
                    .user_posts
                    .write()
                    .await
                    .retain(|p| p.id != post_id);
                self.inner.feed.remove_post(post_id).await;
                Ok(true)
            }
            Ok(false) => {
                debug!(post_id = %post_id, "delete matched no owned post");
                Ok(false)
            }
            Err(e) => {
                self.inner.events.alert("Error", "Failed to delete post.");
                Err(e.into())
            }
        }
    }

    /// Upload any new images, then write the edited fields.
    ///
    /// A failed upload aborts the save before anything is written.
    pub async fn save_profile_edit(&self, user_id: UserId, edit: ProfileEdit) -> ClientResult<()> {
        let avatar_url = match &edit.new_avatar {
            Some(path) => Some(
                self.inner
                    .uploader
                    .upload_image(path)
                    .await
                    .ok_or(ClientError::UploadFailed)?,
            ),
            None => None,
        };
        let cover_url = match &edit.new_cover {
            Some(path) => Some(
                self.inner
                    .uploader
                    .upload_image(path)
                    .await
                    .ok_or(ClientError::UploadFailed)?,
            ),
            None => None,
        };

        let full_name = edit.full_name.trim();
        let patch = ProfilePatch {
            full_name: Some((!full_name.is_empty()).then(|| full_name.to_string())),
            bio: Some(Some(edit.bio.trim().to_string())),
            avatar_url: avatar_url.map(Some),
            cover_url: cover_url.map(Some),
            dark_mode: Some(edit.dark_mode),
            ..Default::default()
        };

        if let Err(e) = self.update(user_id, patch).await {
            self.inner.events.alert("Error", e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Follow `user_id`'s profile row and posts: profile updates replace the
    /// cached session profile, post changes re-fetch the post list.
    pub async fn watch_user(&self, user_id: UserId) -> ClientResult<()> {
        self.stop_watching();
        let data = &self.inner.data;

        let profile_sub = data
            .subscribe(
                ChangeFilter::table(Table::Profiles)
                    .on(ChangeKind::Update)
                    .where_eq("id", user_id),
            )
            .await?;
        let posts_sub = data
            .subscribe(ChangeFilter::table(Table::Posts).where_eq("user_id", user_id))
            .await?;

        let weak = Arc::downgrade(&self.inner);
        let handles = [
            tokio::spawn(apply_profile_updates(weak.clone(), profile_sub)),
            tokio::spawn(refetch_user_posts(weak, user_id, posts_sub)),
        ];
        if let Ok(mut watchers) = self.inner.watchers.lock() {
            watchers.extend(handles);
        }
        Ok(())
    }

    pub fn stop_watching(&self) {
        if let Ok(mut watchers) = self.inner.watchers.lock() {
            for handle in watchers.drain(..) {
                handle.abort();
            }
        }
    }
}

async fn apply_profile_updates(service: Weak<ProfileInner>, mut subscription: Subscription) {
    while let Some(event) = subscription.recv().await {
        let Some(inner) = service.upgrade() else { break };
        match event.decode::<Profile>() {
            Some(profile) => {
                debug!(user_id = %profile.id, "profile changed remotely");
                inner.session.set_profile(profile);
            }
            None => warn!("undecodable profile change"),
        }
    }
}

async fn refetch_user_posts(service: Weak<ProfileInner>, user_id: UserId, mut subscription: Subscription) {
    while subscription.recv().await.is_some() {
        let Some(inner) = service.upgrade() else { break };
        ProfileService { inner }.posts_by_user(user_id).await;
    }
}

/// Creates the profile row for each user who signs in.
pub struct ProfileProvisioner {
    handle: JoinHandle<()>,
}

impl ProfileProvisioner {
    pub fn start(profiles: ProfileService) -> Self {
        let session = profiles.inner.session.clone();
        let mut rx = session.subscribe();

        let handle = tokio::spawn(async move {
            let mut provisioned: Option<UserId> = None;
            loop {
                let user = rx.borrow_and_update().as_ref().map(|s| s.user.clone());
                match user {
                    Some(user) if provisioned != Some(user.id) => {
                        provisioned = Some(user.id);
                        if let Some(profile) = profiles.ensure_profile(&user).await {
                            session.set_profile(profile);
                        }
                    }
                    Some(_) => {}
                    None => provisioned = None,
                }

                if rx.changed().await.is_err() {
                    break;
                }
            }
        });

        Self { handle }
    }
}

impl Drop for ProfileProvisioner {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
