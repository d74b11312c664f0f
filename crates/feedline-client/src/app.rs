//! Wiring: one [`FeedClient`] owns every component over a single set of
//! backend services.

use std::sync::{Arc, Mutex};

use feedline_net::{HostedConfig, HostedData, HostedUploader};
use feedline_shared::service::{AuthService, DataService, UploadService};
use feedline_store::Database;
use tracing::info;

use crate::compose::PostComposer;
use crate::config::{Backend, ClientConfig};
use crate::error::{ClientError, ClientResult};
use crate::events::EventBus;
use crate::feed::FeedSynchronizer;
use crate::profile::{ProfileProvisioner, ProfileService};
use crate::session::SessionStore;
use crate::thread::CommentThread;
use crate::upload::ImageUploader;

pub struct FeedClient {
    pub events: EventBus,
    pub session: SessionStore,
    pub feed: FeedSynchronizer,
    pub thread: CommentThread,
    pub profiles: ProfileService,
    pub composer: PostComposer,
    pub uploader: ImageUploader,
    provisioner: Mutex<Option<ProfileProvisioner>>,
}

impl FeedClient {
    /// Build a client for the configured backend.
    pub fn open(config: &ClientConfig) -> ClientResult<Self> {
        match config.backend {
            Backend::Local => {
                let db = match &config.db_path {
                    Some(path) => Database::open_at(path),
                    None => Database::new(),
                }
                .map_err(|e| ClientError::Config(e.to_string()))?;
                let db = Arc::new(db);
                info!(path = ?db.path(), "using local backend");
                Ok(Self::with_services(db.clone(), db.clone(), db))
            }
            Backend::Hosted => {
                let data_url = config
                    .data_url
                    .as_deref()
                    .ok_or_else(|| ClientError::Config("FEEDLINE_DATA_URL is not set".into()))?;
                let anon_key = config
                    .anon_key
                    .as_deref()
                    .ok_or_else(|| ClientError::Config("FEEDLINE_ANON_KEY is not set".into()))?;
                let upload_url = config
                    .upload_url
                    .as_deref()
                    .ok_or_else(|| ClientError::Config("FEEDLINE_UPLOAD_URL is not set".into()))?;

                let mut hosted = HostedConfig::new(data_url, anon_key)
                    .map_err(|e| ClientError::Config(e.to_string()))?;
                hosted.http_timeout = config.http_timeout;
                hosted.heartbeat = config.realtime_heartbeat;

                let data = Arc::new(
                    HostedData::new(hosted).map_err(|e| ClientError::Config(e.to_string()))?,
                );
                let uploads = HostedUploader::new(upload_url, config.http_timeout)
                    .map_err(|e| ClientError::Config(e.to_string()))?;
                info!(data_url, upload_url, "using hosted backend");
                Ok(Self::with_services(data.clone(), data, Arc::new(uploads)))
            }
        }
    }

    pub fn with_services(
        data: Arc<dyn DataService>,
        auth: Arc<dyn AuthService>,
        uploads: Arc<dyn UploadService>,
    ) -> Self {
        let events = EventBus::new();
        let session = SessionStore::new(auth, events.clone());
        let uploader = ImageUploader::new(uploads, events.clone());
        let feed = FeedSynchronizer::new(data.clone(), session.clone(), events.clone());
        let thread = CommentThread::new(data.clone(), session.clone(), feed.clone(), events.clone());
        let profiles = ProfileService::new(
            data.clone(),
            session.clone(),
            feed.clone(),
            uploader.clone(),
            events.clone(),
        );
        let composer = PostComposer::new(
            data,
            session.clone(),
            uploader.clone(),
            feed.clone(),
            events.clone(),
        );

        Self {
            events,
            session,
            feed,
            thread,
            profiles,
            composer,
            uploader,
            provisioner: Mutex::new(None),
        }
    }

    /// Start background work: profile provisioning on sign-in and the feed's
    /// realtime watchers. Must be called inside a Tokio runtime.
    pub async fn start(&self) -> ClientResult<()> {
        if let Ok(mut provisioner) = self.provisioner.lock() {
            if provisioner.is_none() {
                *provisioner = Some(ProfileProvisioner::start(self.profiles.clone()));
            }
        }
        self.feed.start_realtime().await
    }

    /// Stop every watcher this client started.
    pub async fn shutdown(&self) {
        if let Ok(mut provisioner) = self.provisioner.lock() {
            provisioner.take();
        }
        self.feed.stop_realtime();
        self.profiles.stop_watching();
        self.thread.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use feedline_shared::types::UserId;

    use super::*;
    use crate::events::ClientEvent;

    fn local_config(dir: &tempfile::TempDir) -> ClientConfig {
        ClientConfig {
            db_path: Some(dir.path().join("client.db")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn hosted_requires_all_urls() {
        let config = ClientConfig {
            backend: Backend::Hosted,
            data_url: Some("https://project.example.co".into()),
            anon_key: Some("anon".into()),
            ..Default::default()
        };
        assert!(matches!(FeedClient::open(&config), Err(ClientError::Config(_))));

        let config = ClientConfig {
            upload_url: Some("https://deploy.example.cloud".into()),
            ..config
        };
        assert!(FeedClient::open(&config).is_ok());
    }

    #[tokio::test]
    async fn sign_in_provisions_profile_and_post_reaches_feed() {
        let dir = tempfile::tempdir().unwrap();
        let client = FeedClient::open(&local_config(&dir)).unwrap();
        client.start().await.unwrap();

        let mut sessions = client.session.subscribe();
        let me = client
            .session
            .sign_up("ada@example.com", "hunter22")
            .await
            .unwrap()
            .user_id();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if sessions.borrow_and_update().as_ref().and_then(|s| s.profile.as_ref()).is_some() {
                    break;
                }
                sessions.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        let post = client.composer.create_post("first post", None).await.unwrap();
        let feed = client.feed.posts().await;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id(), post.id);
        assert_eq!(feed[0].post.user_id, Some(me));
        assert_eq!(feed[0].author_name, "ada");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn comment_flow_updates_thread_and_feed() {
        let dir = tempfile::tempdir().unwrap();
        let client = FeedClient::open(&local_config(&dir)).unwrap();
        client.session.sign_up("ada@example.com", "hunter22").await.unwrap();
        let post = client.composer.create_post("discuss", None).await.unwrap();
        let mut rx = client.events.subscribe();

        client.thread.open(post.id).await;
        client.thread.post_comment("agreed").await.unwrap();

        assert_eq!(client.thread.comments().await.len(), 1);
        assert_eq!(client.feed.post(post.id).await.unwrap().comments_count, 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            ClientEvent::ThreadUpdated { post_id: post.id }
        );
    }

    #[tokio::test]
    async fn profile_lookup_for_unknown_user_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let client = FeedClient::open(&local_config(&dir)).unwrap();
        let stranger = UserId::new();

        let profile = client.profiles.get_or_create(stranger).await;
        assert_eq!(profile.username, Some(stranger.handle()));
    }
}
