//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts against a local SQLite
//! file with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use feedline_shared::constants::{DEFAULT_HEARTBEAT_SECS, DEFAULT_HTTP_TIMEOUT_SECS};

/// Which implementation of the service traits to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// SQLite file plus in-process change feed.
    #[default]
    Local,
    /// Hosted data/auth/realtime service plus hosted upload service.
    Hosted,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "hosted" => Ok(Backend::Hosted),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Env: `FEEDLINE_BACKEND` (`local` | `hosted`)
    /// Default: `local`
    pub backend: Backend,

    /// Base URL of the hosted data/auth/realtime service.
    /// Env: `FEEDLINE_DATA_URL`
    pub data_url: Option<String>,

    /// Public API key for the hosted data service.
    /// Env: `FEEDLINE_ANON_KEY`
    pub anon_key: Option<String>,

    /// Deployment URL of the hosted upload service.
    /// Env: `FEEDLINE_UPLOAD_URL`
    pub upload_url: Option<String>,

    /// SQLite file for the local backend.
    /// Env: `FEEDLINE_DB_PATH`
    /// Default: the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Env: `FEEDLINE_HTTP_TIMEOUT_SECS`
    /// Default: 30
    pub http_timeout: Duration,

    /// Env: `FEEDLINE_REALTIME_HEARTBEAT_SECS`
    /// Default: 30
    pub realtime_heartbeat: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            data_url: None,
            anon_key: None,
            upload_url: None,
            db_path: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            realtime_heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup("FEEDLINE_BACKEND") {
            match value.parse() {
                Ok(backend) => config.backend = backend,
                Err(e) => tracing::warn!(value = %value, error = %e, "Invalid FEEDLINE_BACKEND, using default"),
            }
        }

        config.data_url = lookup("FEEDLINE_DATA_URL").filter(|v| !v.trim().is_empty());
        config.anon_key = lookup("FEEDLINE_ANON_KEY").filter(|v| !v.trim().is_empty());
        config.upload_url = lookup("FEEDLINE_UPLOAD_URL").filter(|v| !v.trim().is_empty());
        config.db_path = lookup("FEEDLINE_DB_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        if let Some(secs) = parse_secs(&lookup, "FEEDLINE_HTTP_TIMEOUT_SECS") {
            config.http_timeout = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "FEEDLINE_REALTIME_HEARTBEAT_SECS") {
            config.realtime_heartbeat = secs;
        }

        config
    }
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let value = lookup(key)?;
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(key, value = %value, "Invalid duration, using default");
            None
        }
    }
}
