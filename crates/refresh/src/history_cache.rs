//! Read-through cache over history files.
//!
//! A file is served as two columns, `[[times...], [speeds...]]`, each
//! starting with its header cell. Entries expire a day after loading and
//! the least recently used entry is evicted once capacity is reached.
//! Concurrent misses on one key each read the file.

use common::{Error, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::history::file_path;

#[derive(Debug, Clone)]
struct CachedFile {
    payload: Arc<String>,
    loaded_at: Instant,
}

#[derive(Debug)]
pub struct HistoryFileCache {
    dir: PathBuf,
    ttl: Duration,
    entries: Mutex<LruCache<String, CachedFile>>,
}

impl HistoryFileCache {
    /// Capacity 0 is treated as 1.
    pub fn new(dir: impl Into<PathBuf>, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            dir: dir.into(),
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached payload for `key`, loading it from disk on a miss.
    pub async fn get(&self, key: &str) -> Result<Arc<String>> {
        validate_key(key)?;

        {
            let mut entries = self.entries.lock().await;
            let hit = entries
                .get(key)
                .map(|entry| (entry.payload.clone(), entry.loaded_at.elapsed() < self.ttl));
            match hit {
                Some((payload, true)) => return Ok(payload),
                Some((_, false)) => {
                    debug!("History entry {} expired", key);
                    entries.pop(key);
                }
                None => {}
            }
        }

        let payload = Arc::new(load_columns(&file_path(&self.dir, key)).await?);
        self.entries.lock().await.put(
            key.to_string(),
            CachedFile {
                payload: payload.clone(),
                loaded_at: Instant::now(),
            },
        );
        Ok(payload)
    }

    /// Whether `key` is currently held, without touching recency.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Keys look like `03-2017-4`: two-digit month, four-digit year, index.
fn validate_key(key: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('-').collect();
    let well_formed = parts.len() == 3
        && parts.iter().all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
        && parts[0].len() == 2
        && parts[1].len() == 4;
    if well_formed {
        Ok(())
    } else {
        Err(Error::InvalidKey(key.to_string()))
    }
}

async fn load_columns(path: &Path) -> Result<String> {
    let body = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::HistoryRead(format!("{}: {}", path.display(), e)))?;

    let mut times: Vec<&str> = Vec::new();
    let mut speeds: Vec<&str> = Vec::new();
    for (number, line) in body.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let Some((time, speed)) = line.split_once(',') else {
            return Err(Error::HistoryRead(format!(
                "{}: malformed line {}",
                path.display(),
                number + 1
            )));
        };
        times.push(time);
        speeds.push(speed);
    }
    if times.is_empty() {
        return Err(Error::HistoryRead(format!("{}: empty file", path.display())));
    }

    debug!("Loaded {} history rows from {}", times.len() - 1, path.display());
    Ok(serde_json::to_string(&[times, speeds])?)
}
