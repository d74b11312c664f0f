//! # feedline-client
//!
//! The client core: an explicit [`SessionStore`], the [`FeedSynchronizer`]
//! with its like toggle, the [`CommentThread`] loader, the
//! [`ProfileService`], the image upload handshake and the post composer.
//! Everything talks to the backend through the service traits in
//! `feedline-shared`, so the same code runs on the local store and on the
//! hosted services. [`FeedClient`] wires the pieces together.

pub mod app;
pub mod compose;
pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod profile;
pub mod session;
pub mod thread;
pub mod upload;

use tracing_subscriber::{fmt, EnvFilter};

pub use app::FeedClient;
pub use compose::PostComposer;
pub use config::{Backend, ClientConfig};
pub use error::{ClientError, ClientResult};
pub use events::{ClientEvent, EventBus};
pub use feed::{FeedPost, FeedSynchronizer};
pub use profile::{ProfileEdit, ProfileProvisioner, ProfileService};
pub use session::{Session, SessionStore};
pub use thread::{CommentThread, ThreadComment};
pub use upload::ImageUploader;

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "feedline_client=debug,feedline_store=info,feedline_net=info,warn";

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
