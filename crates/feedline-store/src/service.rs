//! Service-trait implementations over the local database.

use async_trait::async_trait;
use feedline_shared::models::{Comment, Like, NewComment, NewPost, Post, Profile, ProfilePatch};
use feedline_shared::realtime::{ChangeFilter, Subscription};
use feedline_shared::service::{AuthService, AuthSession, DataService, UploadService};
use feedline_shared::types::{PostId, StorageId, UserId};
use feedline_shared::{ServiceError, ServiceResult};

use crate::database::Database;

#[async_trait]
impl DataService for Database {
    async fn list_posts(&self) -> ServiceResult<Vec<Post>> {
        Ok(self.list_all_posts()?)
    }

    async fn posts_by_user(&self, user_id: UserId) -> ServiceResult<Vec<Post>> {
        Ok(self.list_posts_for_user(user_id)?)
    }

    async fn insert_post(&self, post: &NewPost) -> ServiceResult<Post> {
        Ok(self.create_post(post)?)
    }

    async fn delete_post(&self, post_id: PostId, owner: UserId) -> ServiceResult<bool> {
        Ok(self.remove_post(post_id, owner)?)
    }

    async fn profiles_by_ids(&self, ids: &[UserId]) -> ServiceResult<Vec<Profile>> {
        Ok(self.find_profiles(ids)?)
    }

    async fn get_profile(&self, id: UserId) -> ServiceResult<Profile> {
        Ok(self.find_profile(id)?)
    }

    async fn insert_profile(&self, profile: &Profile) -> ServiceResult<Profile> {
        Ok(self.create_profile(profile)?)
    }

    async fn update_profile(&self, id: UserId, patch: &ProfilePatch) -> ServiceResult<()> {
        if self.patch_profile(id, patch)? {
            Ok(())
        } else {
            Err(ServiceError::NotFound)
        }
    }

    async fn liked_post_ids(&self, user_id: UserId) -> ServiceResult<Vec<PostId>> {
        Ok(self.liked_posts_for_user(user_id)?)
    }

    async fn like_post_ids(&self, post_ids: &[PostId]) -> ServiceResult<Vec<PostId>> {
        Ok(self.like_rows_for_posts(post_ids)?)
    }

    async fn insert_like(&self, like: &Like) -> ServiceResult<()> {
        Ok(self.add_like(like)?)
    }

    async fn delete_like(&self, like: &Like) -> ServiceResult<bool> {
        Ok(self.remove_like(like)?)
    }

    async fn comment_post_ids(&self, post_ids: &[PostId]) -> ServiceResult<Vec<PostId>> {
        Ok(self.comment_rows_for_posts(post_ids)?)
    }

    async fn comments_for_post(&self, post_id: PostId) -> ServiceResult<Vec<Comment>> {
        Ok(self.comments_on_post(post_id)?)
    }

    async fn insert_comment(&self, comment: &NewComment) -> ServiceResult<Comment> {
        Ok(self.create_comment(comment)?)
    }

    async fn subscribe(&self, filter: ChangeFilter) -> ServiceResult<Subscription> {
        Ok(self.watch(filter))
    }
}

#[async_trait]
impl AuthService for Database {
    async fn sign_up(&self, email: &str, password: &str) -> ServiceResult<AuthSession> {
        Ok(self.register_user(email, password)?)
    }

    async fn sign_in(&self, email: &str, password: &str) -> ServiceResult<AuthSession> {
        Ok(self.login(email, password)?)
    }

    async fn sign_out(&self, session: &AuthSession) -> ServiceResult<()> {
        Ok(self.logout(&session.access_token)?)
    }
}

#[async_trait]
impl UploadService for Database {
    async fn generate_upload_url(&self) -> ServiceResult<String> {
        Ok(self.open_upload_slot()?)
    }

    async fn put_blob(
        &self,
        upload_url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ServiceResult<StorageId> {
        Ok(self.store_blob(upload_url, &bytes, content_type)?)
    }

    async fn resolve_url(&self, storage_id: &StorageId) -> ServiceResult<String> {
        Ok(self.blob_url(storage_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("service.db")).unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn errors_keep_their_meaning_across_the_trait() {
        let (db, _dir) = test_db();
        let id = UserId::new();

        assert_eq!(
            DataService::get_profile(&db, id).await,
            Err(ServiceError::NotFound)
        );

        db.insert_profile(&Profile::placeholder(id)).await.unwrap();
        assert!(matches!(
            db.insert_profile(&Profile::placeholder(id)).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_of_missing_profile_is_not_found() {
        let (db, _dir) = test_db();
        let patch = ProfilePatch {
            bio: Some(Some("hello".into())),
            ..Default::default()
        };
        assert_eq!(
            db.update_profile(UserId::new(), &patch).await,
            Err(ServiceError::NotFound)
        );
    }

    #[tokio::test]
    async fn upload_handshake_through_trait() {
        let (db, _dir) = test_db();
        let target = db.generate_upload_url().await.unwrap();
        let id = db
            .put_blob(&target, b"png".to_vec(), "image/png")
            .await
            .unwrap();
        let url = db.resolve_url(&id).await.unwrap();
        assert!(url.ends_with(&id.0));
    }

    #[tokio::test]
    async fn sign_out_revokes_session() {
        let (db, _dir) = test_db();
        let session = db.sign_up("grace@example.com", "cobol-rules").await.unwrap();
        db.sign_out(&session).await.unwrap();
        assert!(db.session_user(&session.access_token).is_err());
    }
}
