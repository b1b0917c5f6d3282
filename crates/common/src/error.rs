//! Unified error type for traffic-watch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Unable to load value: {0}")]
    Collect(String),

    #[error("History read failed: {0}")]
    HistoryRead(String),

    #[error("Invalid history key: {0}")]
    InvalidKey(String),

    #[error("Duplicate segment in snapshot: {0}")]
    DuplicateSegment(u32),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
