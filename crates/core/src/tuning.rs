//! Runtime knobs read from the environment.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    /// Maximum age of a discovery snapshot before it is refreshed.
    pub discovery_ttl: Duration,
    /// A lookup miss only forces a refresh once the snapshot is at least this old.
    pub discovery_min_refresh: Duration,
    /// Bound applied to every call to the cluster.
    pub request_timeout: Duration,
    pub create_attempts: u32,
    pub create_backoff: Duration,
    pub create_jitter: f64,
    pub restore_concurrency: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            discovery_ttl: Duration::from_secs(300),
            discovery_min_refresh: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            create_attempts: 5,
            create_backoff: Duration::from_millis(10),
            create_jitter: 0.1,
            restore_concurrency: 1,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

impl Tuning {
    /// Defaults overridden by `KRB_*` variables; unparseable values are ignored.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            discovery_ttl: env_parse("KRB_DISCOVERY_TTL_SECS").map(Duration::from_secs).unwrap_or(d.discovery_ttl),
            discovery_min_refresh: env_parse("KRB_DISCOVERY_MIN_REFRESH_SECS").map(Duration::from_secs).unwrap_or(d.discovery_min_refresh),
            request_timeout: env_parse("KRB_REQUEST_TIMEOUT_SECS").map(Duration::from_secs).unwrap_or(d.request_timeout),
            create_attempts: env_parse::<u32>("KRB_CREATE_ATTEMPTS").map(|n| n.max(1)).unwrap_or(d.create_attempts),
            create_backoff: env_parse("KRB_CREATE_BACKOFF_MS").map(Duration::from_millis).unwrap_or(d.create_backoff),
            create_jitter: d.create_jitter,
            restore_concurrency: env_parse::<usize>("KRB_RESTORE_CONCURRENCY").map(|n| n.max(1)).unwrap_or(d.restore_concurrency),
        }
    }

    /// Tuning for tests: no waiting between attempts, discovery always fresh enough.
    pub fn immediate() -> Self {
        Self { create_backoff: Duration::ZERO, create_jitter: 0.0, discovery_min_refresh: Duration::ZERO, ..Self::default() }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
