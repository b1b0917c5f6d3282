//! Periodic forced refresh.
//!
//! Keeps the cache warm and the history growing with no inbound requests.
//! Ticks immediately, then every period; a slow cycle delays the next tick
//! instead of bursting to catch up.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::cache::RefreshCache;

/// Spawn the refresh loop. It runs until the runtime shuts down.
pub fn schedule(period: Duration, cache: Arc<RefreshCache>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle: u64 = 0;

        loop {
            interval.tick().await;
            cycle = cycle.saturating_add(1);
            match cache.force().await {
                Ok(snapshot) => info!("Refresh cycle {}: {} segments", cycle, snapshot.len()),
                Err(e) => warn!("Refresh cycle {} failed: {}", cycle, e),
            }
        }
    })
}
