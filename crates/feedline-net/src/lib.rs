//! # feedline-net
//!
//! Clients for the hosted services Feedline runs against:
//!
//! - [`HostedData`]: the REST data service and password auth, implementing
//!   [`DataService`](feedline_shared::service::DataService) and
//!   [`AuthService`](feedline_shared::service::AuthService).
//! - [`realtime`]: the change feed over a Phoenix-framed WebSocket.
//! - [`HostedUploader`]: the object upload service, implementing
//!   [`UploadService`](feedline_shared::service::UploadService).

pub mod auth;
pub mod error;
pub mod realtime;
pub mod rest;
pub mod upload;

pub use error::{NetError, NetResult};
pub use rest::{HostedConfig, HostedData};
pub use upload::HostedUploader;
