//! Session configuration, read from `MARKETSYNC_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use marketsync_observability::LogFormat;

const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Configuration of one sync session.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Base URL the transport resolves endpoint paths against.
    pub api_url: String,
    /// Bearer token attached to every request, if any.
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    /// Freshness window of the cached profile (`None` = never expires).
    pub profile_ttl: Option<chrono::Duration>,
    /// Freshness window of cached service sets (`None` = never expires).
    pub services_ttl: Option<chrono::Duration>,
    /// Service limit used by full sync when the caller does not pass one.
    pub full_sync_limit: u32,
    /// Service limit used by quick sync when the caller does not pass one.
    pub quick_sync_limit: u32,
    /// Service limit of the "fast" download variant.
    pub fast_limit: u32,
    /// SQLite database file; `None` resolves to the OS data directory.
    pub database_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            profile_ttl: Some(chrono::Duration::hours(24)),
            services_ttl: Some(chrono::Duration::hours(1)),
            full_sync_limit: 50,
            quick_sync_limit: 10,
            fast_limit: 10,
            database_path: None,
            log_format: LogFormat::Json,
        }
    }
}

impl SyncConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup (tests, embedded hosts).
    ///
    /// Unset variables keep their defaults; unparsable values are logged and
    /// ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = non_empty(lookup("MARKETSYNC_API_URL")) {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        config.auth_token = non_empty(lookup("MARKETSYNC_AUTH_TOKEN"));

        if let Some(secs) = parse_u64(&lookup, "MARKETSYNC_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ttl) = parse_ttl(&lookup, "MARKETSYNC_PROFILE_TTL_SECS") {
            config.profile_ttl = ttl;
        }
        if let Some(ttl) = parse_ttl(&lookup, "MARKETSYNC_SERVICES_TTL_SECS") {
            config.services_ttl = ttl;
        }
        if let Some(limit) = parse_limit(&lookup, "MARKETSYNC_FULL_SYNC_LIMIT") {
            config.full_sync_limit = limit;
        }
        if let Some(limit) = parse_limit(&lookup, "MARKETSYNC_QUICK_SYNC_LIMIT") {
            config.quick_sync_limit = limit;
        }
        if let Some(limit) = parse_limit(&lookup, "MARKETSYNC_FAST_LIMIT") {
            config.fast_limit = limit;
        }
        config.database_path = non_empty(lookup("MARKETSYNC_DB_PATH")).map(PathBuf::from);

        if let Some(raw) = non_empty(lookup("MARKETSYNC_LOG_FORMAT")) {
            match LogFormat::parse(&raw) {
                Some(format) => config.log_format = format,
                None => tracing::warn!("MARKETSYNC_LOG_FORMAT '{raw}' not recognized; using default"),
            }
        }

        config
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_u64<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = non_empty(lookup(key))?;
    match raw.parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("{key} '{raw}' is not a non-negative integer; using default");
            None
        }
    }
}

fn parse_limit<F>(lookup: &F, key: &str) -> Option<u32>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_u64(lookup, key)?;
    match u32::try_from(value) {
        Ok(limit) if limit > 0 => Some(limit),
        _ => {
            tracing::warn!("{key} must be between 1 and {}; using default", u32::MAX);
            None
        }
    }
}

/// `0` disables expiry; any other value is a TTL in seconds.
fn parse_ttl<F>(lookup: &F, key: &str) -> Option<Option<chrono::Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_u64(lookup, key)?;
    if secs == 0 {
        return Some(None);
    }
    let ttl = i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .filter(|ttl| chrono::Utc::now().checked_add_signed(*ttl).is_some());
    match ttl {
        Some(ttl) => Some(Some(ttl)),
        None => {
            tracing::warn!("{key} is out of range; using default");
            None
        }
    }
}
