//! Service seams.
//!
//! The client core only talks to these traits. `feedline-store` implements
//! all three on a local SQLite file; `feedline-net` implements them against
//! the hosted data/auth/realtime service and the hosted upload service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;
use crate::models::{Comment, Like, NewComment, NewPost, Post, Profile, ProfilePatch};
use crate::realtime::{ChangeFilter, Subscription};
use crate::types::{PostId, StorageId, UserId};

/// Relational store plus realtime change feed.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Every post, newest first.
    async fn list_posts(&self) -> ServiceResult<Vec<Post>>;

    /// One author's posts, newest first.
    async fn posts_by_user(&self, user_id: UserId) -> ServiceResult<Vec<Post>>;

    async fn insert_post(&self, post: &NewPost) -> ServiceResult<Post>;

    /// Delete scoped to the owner. Returns whether a row went away.
    async fn delete_post(&self, post_id: PostId, owner: UserId) -> ServiceResult<bool>;

    async fn profiles_by_ids(&self, ids: &[UserId]) -> ServiceResult<Vec<Profile>>;

    /// `ServiceError::NotFound` when the user has no profile row.
    async fn get_profile(&self, id: UserId) -> ServiceResult<Profile>;

    /// `ServiceError::Conflict` when a row with the same id exists.
    async fn insert_profile(&self, profile: &Profile) -> ServiceResult<Profile>;

    async fn update_profile(&self, id: UserId, patch: &ProfilePatch) -> ServiceResult<()>;

    /// Posts the user has liked.
    async fn liked_post_ids(&self, user_id: UserId) -> ServiceResult<Vec<PostId>>;

    /// One entry per like row on any of `post_ids`.
    async fn like_post_ids(&self, post_ids: &[PostId]) -> ServiceResult<Vec<PostId>>;

    /// `ServiceError::Conflict` when the pair already exists.
    async fn insert_like(&self, like: &Like) -> ServiceResult<()>;

    /// Returns whether a row went away.
    async fn delete_like(&self, like: &Like) -> ServiceResult<bool>;

    /// One entry per comment row on any of `post_ids`.
    async fn comment_post_ids(&self, post_ids: &[PostId]) -> ServiceResult<Vec<PostId>>;

    /// A post's comments, oldest first.
    async fn comments_for_post(&self, post_id: PostId) -> ServiceResult<Vec<Comment>>;

    async fn insert_comment(&self, comment: &NewComment) -> ServiceResult<Comment>;

    async fn subscribe(&self, filter: ChangeFilter) -> ServiceResult<Subscription>;
}

/// Signed-in identity as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: AuthUser,
    pub access_token: String,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> ServiceResult<AuthSession>;

    async fn sign_in(&self, email: &str, password: &str) -> ServiceResult<AuthSession>;

    async fn sign_out(&self, session: &AuthSession) -> ServiceResult<()>;
}

/// Object upload service: request a write target, write the bytes, resolve a
/// durable URL.
#[async_trait]
pub trait UploadService: Send + Sync {
    async fn generate_upload_url(&self) -> ServiceResult<String>;

    async fn put_blob(
        &self,
        upload_url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ServiceResult<StorageId>;

    /// `ServiceError::NotFound` when the id does not resolve.
    async fn resolve_url(&self, storage_id: &StorageId) -> ServiceResult<String>;
}
