//! Service configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::SegmentId;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// Segments to track, in the order used for snapshots and log files.
    #[serde(default = "default_segments")]
    pub segments: Vec<SegmentId>,

    /// Upstream feed settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Refresh cache timing.
    #[serde(default)]
    pub cache: CacheConfig,

    /// History log and history read cache.
    #[serde(default)]
    pub history: HistoryConfig,

    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where the feed collector reads from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Live speeds/incidents JSON.
    #[serde(default = "default_data_url")]
    pub data_url: String,

    /// Static region metadata (sensor names) served over HTTP.
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,

    /// Local copy of the region metadata, read when `metadata_url` cannot be
    /// fetched (or instead of it when the URL is empty).
    #[serde(default = "default_metadata_path")]
    pub metadata_path: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Refresh cache, force limiter and scheduler timing (all seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a loaded snapshot.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// One forced reload is allowed per this many seconds.
    #[serde(default = "default_force_period")]
    pub force_period_secs: u64,

    /// Background refresh period.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Upper bound on how long a load waits for history logging.
    #[serde(default = "default_log_wait")]
    pub log_wait_secs: u64,
}

/// History log location and read cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_history_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_history_ttl")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn force_period(&self) -> Duration {
        Duration::from_secs(self.force_period_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn log_wait(&self) -> Duration {
        Duration::from_secs(self.log_wait_secs)
    }
}

impl HistoryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl FeedConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

/// SR-92 eastbound, Ralston through the San Mateo Bridge entrance.
fn default_segments() -> Vec<SegmentId> {
    (2645..=2654).collect()
}

fn default_data_url() -> String {
    "http://www.sigalert.com/Data/NoCal/1~j/NoCalData.json?cb=25615489".into()
}
fn default_metadata_url() -> String {
    "http://cdn-static.sigalert.com/154/Zip/RegionInfo/NoCalStatic.js".into()
}
fn default_metadata_path() -> Option<String> {
    Some("static-js-resources".into())
}
fn default_user_agent() -> String {
    "Mozilla/5.0".into()
}
fn default_request_timeout() -> u64 {
    30
}

fn default_ttl() -> u64 {
    15 * 60
}
fn default_force_period() -> u64 {
    60
}
fn default_refresh_interval() -> u64 {
    15 * 60
}
fn default_log_wait() -> u64 {
    10
}

fn default_log_dir() -> String {
    "logs".into()
}
fn default_history_capacity() -> usize {
    20
}
fn default_history_ttl() -> u64 {
    24 * 60 * 60
}

fn default_bind() -> String {
    "0.0.0.0:8888".into()
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            segments: default_segments(),
            feed: FeedConfig::default(),
            cache: CacheConfig::default(),
            history: HistoryConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            data_url: default_data_url(),
            metadata_url: default_metadata_url(),
            metadata_path: default_metadata_path(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            force_period_secs: default_force_period(),
            refresh_interval_secs: default_refresh_interval(),
            log_wait_secs: default_log_wait(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            cache_capacity: default_history_capacity(),
            cache_ttl_secs: default_history_ttl(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}
