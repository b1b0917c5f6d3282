//! Configuration loader: merges the .env file, config.toml and env vars.

use common::{Error, SegmentId, TrafficConfig};
use std::path::Path;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_segments(raw: &str) -> Result<Vec<SegmentId>, Error> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<SegmentId>().map_err(|_| {
                Error::Config(format!(
                    "TRAFFIC_SEGMENTS must be a comma-separated list of ids, got {s:?}"
                ))
            })
        })
        .collect()
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn validate_config(config: &TrafficConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.segments.is_empty() {
        issues.push("segments must contain at least one segment id".into());
    }
    let mut seen = std::collections::HashSet::new();
    for id in &config.segments {
        if !seen.insert(id) {
            issues.push(format!("segments contains {} more than once", id));
        }
    }

    if config.feed.data_url.trim().is_empty() {
        issues.push("feed.data_url must be set".into());
    }
    if config.feed.metadata_path.is_none() && config.feed.metadata_url.trim().is_empty() {
        issues.push("feed.metadata_url must be set when feed.metadata_path is not".into());
    }
    if config.feed.request_timeout_secs == 0 {
        issues.push("feed.request_timeout_secs must be > 0".into());
    }

    if config.cache.ttl_secs == 0 {
        issues.push("cache.ttl_secs must be > 0".into());
    }
    if config.cache.force_period_secs == 0 {
        issues.push("cache.force_period_secs must be > 0".into());
    }
    if config.cache.refresh_interval_secs == 0 {
        issues.push("cache.refresh_interval_secs must be > 0".into());
    }
    if config.cache.log_wait_secs == 0 {
        issues.push("cache.log_wait_secs must be > 0".into());
    }

    if config.history.log_dir.trim().is_empty() {
        issues.push("history.log_dir must be set".into());
    }
    if config.history.cache_capacity == 0 {
        issues.push("history.cache_capacity must be > 0".into());
    }
    if config.history.cache_ttl_secs == 0 {
        issues.push("history.cache_ttl_secs must be > 0".into());
    }

    if config.server.bind.parse::<std::net::SocketAddr>().is_err() {
        issues.push(format!("server.bind {:?} is not a socket address", config.server.bind));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load service configuration from environment and optional config file.
pub fn load_config(config_path: &Path) -> Result<TrafficConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults, replaced by the config file if present.
    let mut config = TrafficConfig::default();
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        config = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
    }

    // 3. Override with environment variables (highest priority).
    if let Ok(bind) = std::env::var("TRAFFIC_BIND") {
        config.server.bind = bind.trim().to_string();
    }
    if let Ok(url) = std::env::var("TRAFFIC_DATA_URL") {
        config.feed.data_url = url.trim().to_string();
    }
    if let Ok(path) = std::env::var("TRAFFIC_METADATA_PATH") {
        // An empty value drops the local fallback.
        config.feed.metadata_path = non_empty(path);
    }
    if let Ok(dir) = std::env::var("TRAFFIC_LOG_DIR") {
        config.history.log_dir = dir.trim().to_string();
    }
    if let Ok(raw) = std::env::var("TRAFFIC_REFRESH_SECS") {
        config.cache.refresh_interval_secs = parse_positive_u64(&raw, "TRAFFIC_REFRESH_SECS")?;
    }
    if let Ok(raw) = std::env::var("TRAFFIC_SEGMENTS") {
        config.segments = parse_segments(&raw)?;
    }

    validate_config(&config)?;

    Ok(config)
}
