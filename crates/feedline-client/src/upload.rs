//! Image upload handshake.
//!
//! 1. ask the upload service for a write target,
//! 2. send the raw bytes there with their content type, getting back a
//!    storage id,
//! 3. exchange the storage id for a durable URL.
//!
//! Any failing step alerts the user and yields `None`. Nothing is retried;
//! the caller decides whether to abort the surrounding save.

use std::path::Path;
use std::sync::Arc;

use feedline_shared::constants::MAX_IMAGE_SIZE;
use feedline_shared::service::UploadService;
use feedline_shared::ServiceResult;
use tracing::{debug, info, warn};

use crate::events::EventBus;

const ALERT_TITLE: &str = "Upload Failed";
const ALERT_MESSAGE: &str = "Failed to upload image";

#[derive(Clone)]
pub struct ImageUploader {
    service: Arc<dyn UploadService>,
    events: EventBus,
}

impl ImageUploader {
    pub fn new(service: Arc<dyn UploadService>, events: EventBus) -> Self {
        Self { service, events }
    }

    /// Upload a local image file and return its durable URL.
    pub async fn upload_image(&self, path: &Path) -> Option<String> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read image");
                self.events.alert(ALERT_TITLE, ALERT_MESSAGE);
                return None;
            }
        };

        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        self.upload_bytes(bytes, &content_type).await
    }

    /// Run the handshake for bytes already in memory.
    pub async fn upload_bytes(&self, bytes: Vec<u8>, content_type: &str) -> Option<String> {
        if bytes.is_empty() || bytes.len() > MAX_IMAGE_SIZE {
            warn!(size = bytes.len(), max = MAX_IMAGE_SIZE, "image rejected before upload");
            self.events.alert(ALERT_TITLE, ALERT_MESSAGE);
            return None;
        }

        match self.handshake(bytes, content_type).await {
            Ok(url) => {
                info!(url = %url, "image uploaded");
                Some(url)
            }
            Err(e) => {
                warn!(error = %e, "image upload failed");
                self.events.alert(ALERT_TITLE, ALERT_MESSAGE);
                None
            }
        }
    }

    async fn handshake(&self, bytes: Vec<u8>, content_type: &str) -> ServiceResult<String> {
        let target = self.service.generate_upload_url().await?;
        debug!(size = bytes.len(), content_type, "upload target issued");

        let storage_id = self.service.put_blob(&target, bytes, content_type).await?;
        self.service.resolve_url(&storage_id).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use feedline_shared::types::StorageId;
    use feedline_shared::ServiceError;
    use feedline_store::Database;

    use super::*;
    use crate::events::ClientEvent;

    /// Upload service that fails at a chosen step and counts calls.
    #[derive(Default)]
    pub(crate) struct FlakyUploads {
        pub fail_generate: bool,
        pub fail_put: bool,
        pub generate_calls: AtomicUsize,
        pub put_calls: AtomicUsize,
        pub resolve_calls: AtomicUsize,
    }

    #[async_trait]
    impl UploadService for FlakyUploads {
        async fn generate_upload_url(&self) -> ServiceResult<String> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_generate {
                return Err(ServiceError::Transport("connection reset".into()));
            }
            Ok("https://uploads.test/target".into())
        }

        async fn put_blob(
            &self,
            _upload_url: &str,
            _bytes: Vec<u8>,
            _content_type: &str,
        ) -> ServiceResult<StorageId> {
            self.put_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_put {
                return Err(ServiceError::Api {
                    status: 500,
                    message: "storage unavailable".into(),
                });
            }
            Ok(StorageId("kg2abc".into()))
        }

        async fn resolve_url(&self, storage_id: &StorageId) -> ServiceResult<String> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://cdn.test/{storage_id}"))
        }
    }

    #[tokio::test]
    async fn failed_put_skips_resolve_and_alerts() {
        let service = Arc::new(FlakyUploads {
            fail_put: true,
            ..Default::default()
        });
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let uploader = ImageUploader::new(service.clone(), events);

        assert_eq!(uploader.upload_bytes(b"img".to_vec(), "image/jpeg").await, None);
        assert_eq!(service.put_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.resolve_calls.load(Ordering::SeqCst), 0);
        assert!(matches!(rx.recv().await.unwrap(), ClientEvent::Alert { .. }));
    }

    #[tokio::test]
    async fn failed_generate_stops_immediately() {
        let service = Arc::new(FlakyUploads {
            fail_generate: true,
            ..Default::default()
        });
        let uploader = ImageUploader::new(service.clone(), EventBus::new());

        assert_eq!(uploader.upload_bytes(b"img".to_vec(), "image/png").await, None);
        assert_eq!(service.generate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.put_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_retry_after_failure() {
        let service = Arc::new(FlakyUploads {
            fail_put: true,
            ..Default::default()
        });
        let uploader = ImageUploader::new(service.clone(), EventBus::new());
        uploader.upload_bytes(b"img".to_vec(), "image/png").await;
        assert_eq!(service.generate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn successful_handshake_returns_resolved_url() {
        let service = Arc::new(FlakyUploads::default());
        let uploader = ImageUploader::new(service, EventBus::new());
        assert_eq!(
            uploader.upload_bytes(b"img".to_vec(), "image/png").await.as_deref(),
            Some("https://cdn.test/kg2abc")
        );
    }

    #[tokio::test]
    async fn uploads_file_to_local_store_with_guessed_type() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_at(&dir.path().join("upload.db")).unwrap());
        let image = dir.path().join("cat.png");
        std::fs::write(&image, b"\x89PNG fake").unwrap();

        let uploader = ImageUploader::new(db.clone(), EventBus::new());
        let url = uploader.upload_image(&image).await.unwrap();

        let (data, content_type) = db.read_blob(&url).unwrap();
        assert_eq!(data, b"\x89PNG fake");
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn missing_file_and_empty_bytes_fail() {
        let uploader = ImageUploader::new(Arc::new(FlakyUploads::default()), EventBus::new());
        assert!(uploader
            .upload_image(Path::new("/definitely/not/here.jpg"))
            .await
            .is_none());
        assert!(uploader.upload_bytes(Vec::new(), "image/png").await.is_none());
    }
}
