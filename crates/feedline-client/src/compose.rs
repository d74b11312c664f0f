//! New posts: optional image upload, then a single insert.

use std::path::Path;
use std::sync::Arc;

use feedline_shared::models::{NewPost, Post};
use feedline_shared::service::DataService;
use tracing::{error, info};

use crate::error::{ClientError, ClientResult};
use crate::events::EventBus;
use crate::feed::FeedSynchronizer;
use crate::session::SessionStore;
use crate::upload::ImageUploader;

#[derive(Clone)]
pub struct PostComposer {
    data: Arc<dyn DataService>,
    session: SessionStore,
    uploader: ImageUploader,
    feed: FeedSynchronizer,
    events: EventBus,
}

impl PostComposer {
    pub fn new(
        data: Arc<dyn DataService>,
        session: SessionStore,
        uploader: ImageUploader,
        feed: FeedSynchronizer,
        events: EventBus,
    ) -> Self {
        Self {
            data,
            session,
            uploader,
            feed,
            events,
        }
    }

    /// Publish a post for the signed-in user.
    ///
    /// The image, if any, is uploaded first; a failed upload means nothing is
    /// inserted.
    pub async fn create_post(&self, text: &str, image: Option<&Path>) -> ClientResult<Post> {
        let user_id = self.session.require_user()?;
        let text = text.trim();
        if text.is_empty() && image.is_none() {
            return Err(ClientError::EmptyPost);
        }

        let image_url = match image {
            Some(path) => Some(
                self.uploader
                    .upload_image(path)
                    .await
                    .ok_or(ClientError::UploadFailed)?,
            ),
            None => None,
        };

        let new_post = NewPost {
            user_id,
            text: text.to_string(),
            image_url,
        };
        let post = match self.data.insert_post(&new_post).await {
            Ok(post) => post,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "failed to create post");
                self.events.alert("Error", "Failed to create post");
                return Err(e.into());
            }
        };
        info!(post_id = %post.id, has_image = post.image_url.is_some(), "post created");

        self.feed.refresh_feed().await;
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use feedline_store::Database;

    use super::*;
    use crate::events::ClientEvent;
    use crate::upload::tests::FlakyUploads;

    struct Fixture {
        db: Arc<Database>,
        sessions: SessionStore,
        feed: FeedSynchronizer,
        composer: PostComposer,
        events: EventBus,
        dir: tempfile::TempDir,
    }

    fn fixture_with(uploads: Option<Arc<FlakyUploads>>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_at(&dir.path().join("compose.db")).unwrap());
        let events = EventBus::new();
        let sessions = SessionStore::new(db.clone(), events.clone());
        let feed = FeedSynchronizer::new(db.clone(), sessions.clone(), events.clone());
        let uploader = match uploads {
            Some(flaky) => ImageUploader::new(flaky, events.clone()),
            None => ImageUploader::new(db.clone(), events.clone()),
        };
        let composer = PostComposer::new(
            db.clone(),
            sessions.clone(),
            uploader,
            feed.clone(),
            events.clone(),
        );
        Fixture {
            db,
            sessions,
            feed,
            composer,
            events,
            dir,
        }
    }

    #[tokio::test]
    async fn text_post_is_trimmed_and_lands_in_feed() {
        let f = fixture_with(None);
        let me = f.sessions.sign_up("ada@example.com", "hunter22").await.unwrap().user_id();

        let post = f.composer.create_post("  hello world \n", None).await.unwrap();

        assert_eq!(post.text, "hello world");
        assert_eq!(post.user_id, Some(me));
        assert!(post.image_url.is_none());
        assert_eq!(f.feed.posts().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_post_rejected() {
        let f = fixture_with(None);
        f.sessions.sign_up("ada@example.com", "hunter22").await.unwrap();

        assert_eq!(f.composer.create_post("   ", None).await, Err(ClientError::EmptyPost));
        assert!(f.db.list_all_posts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn signed_out_cannot_post() {
        let f = fixture_with(None);
        assert_eq!(
            f.composer.create_post("hello", None).await,
            Err(ClientError::NotSignedIn)
        );
    }

    #[tokio::test]
    async fn image_only_post_carries_uploaded_url() {
        let f = fixture_with(None);
        f.sessions.sign_up("ada@example.com", "hunter22").await.unwrap();
        let image = f.dir.path().join("sunset.jpg");
        std::fs::write(&image, b"jpeg bytes").unwrap();

        let post = f.composer.create_post("", Some(&image)).await.unwrap();

        let url = post.image_url.unwrap();
        let (bytes, content_type) = f.db.read_blob(&url).unwrap();
        assert_eq!(bytes, b"jpeg bytes");
        assert_eq!(content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn failed_upload_inserts_nothing() {
        let flaky = Arc::new(FlakyUploads {
            fail_put: true,
            ..Default::default()
        });
        let f = fixture_with(Some(flaky.clone()));
        f.sessions.sign_up("ada@example.com", "hunter22").await.unwrap();
        let mut rx = f.events.subscribe();
        let image = f.dir.path().join("sunset.jpg");
        std::fs::write(&image, b"jpeg bytes").unwrap();

        let result = f.composer.create_post("look at this", Some(&image)).await;

        assert_eq!(result, Err(ClientError::UploadFailed));
        assert_eq!(flaky.put_calls.load(Ordering::SeqCst), 1);
        assert!(f.db.list_all_posts().unwrap().is_empty());
        assert!(matches!(rx.recv().await.unwrap(), ClientEvent::Alert { .. }));
    }
}
