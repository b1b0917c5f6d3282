//! Regional traffic feed client.
//!
//! Fetches the live speeds/incidents document and the static sensor-name
//! metadata, and turns them into a [`Snapshot`] in configured segment order.

pub mod parse;
pub mod reader;

use async_trait::async_trait;
use common::config::FeedConfig;
use common::{Error, SegmentId, Snapshot, SnapshotCollector};
use tracing::{debug, warn};

pub use reader::{Buffered, DataReader};

/// Collector backed by the live feed.
#[derive(Debug, Clone)]
pub struct FeedCollector {
    data: DataReader,
    metadata: DataReader,
    segments: Vec<SegmentId>,
}

impl FeedCollector {
    pub fn new(data: DataReader, metadata: DataReader, segments: Vec<SegmentId>) -> Self {
        Self {
            data,
            metadata,
            segments,
        }
    }

    /// Build readers from config. Metadata is fetched from `metadata_url`,
    /// falling back to `metadata_path` when set. With an empty URL only the
    /// local file is read.
    pub fn from_config(cfg: &FeedConfig, segments: Vec<SegmentId>) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .pool_max_idle_per_host(2)
            .timeout(cfg.request_timeout())
            .build()
            .map_err(|e| Error::Http(format!("failed to build feed HTTP client: {}", e)))?;

        let data = DataReader::web(client.clone(), cfg.data_url.clone());
        let metadata_url = cfg.metadata_url.trim();
        let metadata = match &cfg.metadata_path {
            Some(path) if metadata_url.is_empty() => DataReader::file(path),
            Some(path) => DataReader::web_with_fallback(client, metadata_url, path),
            None => DataReader::web(client, metadata_url),
        };

        Ok(Self::new(data, metadata, segments))
    }
}

#[async_trait]
impl SnapshotCollector for FeedCollector {
    async fn collect(&self) -> Result<Snapshot, Error> {
        let data = self.data.fetch().await?;
        let mut snapshot = parse::parse_data(&data, &self.segments)?;

        // Names are cosmetic; a broken metadata source must not fail the cycle.
        match self.metadata.fetch().await {
            Ok(metadata) => {
                if let Err(e) = parse::apply_sensor_names(&metadata, &mut snapshot, &self.segments) {
                    warn!("Sensor names from {} unusable: {}", self.metadata.locator(), e);
                }
            }
            Err(e) => warn!("Sensor metadata unavailable: {}", e),
        }

        debug!("Collected {} segments", snapshot.len());
        Ok(snapshot)
    }
}
