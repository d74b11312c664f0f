/// Application name
pub const APP_NAME: &str = "Feedline";

/// Prefix of the handle synthesized for users without a profile name
pub const HANDLE_PREFIX: &str = "user_";

/// Number of leading user-id characters used in a synthesized handle
pub const ID_PREFIX_LEN: usize = 8;

/// Display name of a post whose author is unknown
pub const UNKNOWN_USER: &str = "Unknown User";

/// Schema the hosted tables live in
pub const REALTIME_SCHEMA: &str = "public";

/// Buffered change events per realtime subscription
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// Realtime heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// HTTP request timeout in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Maximum image size accepted by the upload handshake (20 MiB)
pub const MAX_IMAGE_SIZE: usize = 20 * 1024 * 1024;
