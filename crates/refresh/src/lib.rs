//! Refresh, rate limiting and persistence core.
//!
//! Holds the latest snapshot behind a single-flight TTL cache, limits how
//! often clients can force a reload, drives periodic refreshes, and keeps
//! the per-segment CSV history plus a read cache over it.

pub mod cache;
pub mod history;
pub mod history_cache;
pub mod limiter;
pub mod scheduler;

pub use cache::RefreshCache;
pub use history::{HistoryLogger, LogOutcome};
pub use history_cache::HistoryFileCache;
pub use limiter::ForceLimiter;
pub use scheduler::schedule;
