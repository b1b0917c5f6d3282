//! Single-value refresh cache in front of the snapshot collector.
//!
//! Warm reads only take the slot's read lock. Loads are serialized by a
//! separate async gate, and every finished load bumps an epoch so callers
//! that queued behind it adopt its result instead of loading again.

use common::config::CacheConfig;
use common::{Error, Result, Snapshot, SnapshotCollector};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::MutexGuard;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::history::{HistoryLogger, LogOutcome};
use crate::limiter::ForceLimiter;

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Arc<Snapshot>,
    loaded_at: Instant,
}

#[derive(Debug, Default)]
struct Slot {
    entry: Option<CacheEntry>,
    /// Incremented by every completed load, successful or not.
    epoch: u64,
    /// Message of the most recent load, if it failed.
    last_error: Option<String>,
}

pub struct RefreshCache {
    collector: Arc<dyn SnapshotCollector>,
    ttl: Duration,
    limiter: ForceLimiter,
    history: Option<Arc<HistoryLogger>>,
    log_wait: Duration,
    slot: RwLock<Slot>,
    load_gate: tokio::sync::Mutex<()>,
    last_log: Mutex<Option<LogOutcome>>,
}

impl RefreshCache {
    /// Cache with the default force limiter and no history logging.
    pub fn new(collector: Arc<dyn SnapshotCollector>, ttl: Duration) -> Self {
        Self {
            collector,
            ttl,
            limiter: ForceLimiter::new(),
            history: None,
            log_wait: Duration::from_secs(10),
            slot: RwLock::new(Slot::default()),
            load_gate: tokio::sync::Mutex::new(()),
            last_log: Mutex::new(None),
        }
    }

    pub fn from_config(
        collector: Arc<dyn SnapshotCollector>,
        history: Arc<HistoryLogger>,
        cfg: &CacheConfig,
    ) -> Self {
        Self::new(collector, cfg.ttl())
            .with_limiter(ForceLimiter::with_period(cfg.force_period()))
            .with_history(history, cfg.log_wait())
    }

    pub fn with_limiter(mut self, limiter: ForceLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Log every successful load, waiting at most `log_wait` for the write.
    pub fn with_history(mut self, history: Arc<HistoryLogger>, log_wait: Duration) -> Self {
        self.history = Some(history);
        self.log_wait = log_wait;
        self
    }

    /// Current snapshot, loading it if absent or expired.
    pub async fn retrieve(&self) -> Result<Arc<Snapshot>> {
        let seen_epoch = {
            let slot = self.read_slot();
            if let Some(snapshot) = self.fresh(&slot) {
                return Ok(snapshot);
            }
            slot.epoch
        };

        let gate = self.load_gate.lock().await;
        if let Some(result) = self.completed_since(seen_epoch) {
            return result;
        }
        self.load(gate).await
    }

    /// Reload from the collector if the force limiter allows it, otherwise
    /// behave exactly like [`retrieve`](Self::retrieve).
    pub async fn force(&self) -> Result<Arc<Snapshot>> {
        if !self.limiter.try_acquire() {
            debug!("Forced refresh rate limited; serving cached snapshot");
            return self.retrieve().await;
        }

        let gate = self.load_gate.lock().await;
        self.write_slot().entry = None;
        self.load(gate).await
    }

    /// Outcome of the most recent history write, if any load has logged.
    pub fn last_log_outcome(&self) -> Option<LogOutcome> {
        *self.last_log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_slot(&self) -> std::sync::RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slot(&self) -> std::sync::RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn fresh(&self, slot: &Slot) -> Option<Arc<Snapshot>> {
        slot.entry
            .as_ref()
            .filter(|entry| entry.loaded_at.elapsed() < self.ttl)
            .map(|entry| entry.snapshot.clone())
    }

    /// Result of a load that finished after `seen_epoch`, or a fresh entry.
    fn completed_since(&self, seen_epoch: u64) -> Option<Result<Arc<Snapshot>>> {
        let slot = self.read_slot();
        if let Some(snapshot) = self.fresh(&slot) {
            return Some(Ok(snapshot));
        }
        if slot.epoch != seen_epoch {
            if let Some(message) = &slot.last_error {
                return Some(Err(Error::Collect(message.clone())));
            }
        }
        None
    }

    /// Run the collector. The caller must hold the load gate; it is released
    /// before history logging starts.
    async fn load(&self, gate: MutexGuard<'_, ()>) -> Result<Arc<Snapshot>> {
        let started = Instant::now();
        let outcome = self.collector.collect().await.map(Arc::new);

        {
            let mut slot = self.write_slot();
            slot.epoch += 1;
            match &outcome {
                Ok(snapshot) => {
                    slot.entry = Some(CacheEntry {
                        snapshot: snapshot.clone(),
                        loaded_at: Instant::now(),
                    });
                    slot.last_error = None;
                }
                Err(e) => slot.last_error = Some(e.to_string()),
            }
        }
        drop(gate);

        match outcome {
            Ok(snapshot) => {
                info!(
                    "Loaded snapshot: {} segments in {}ms",
                    snapshot.len(),
                    started.elapsed().as_millis()
                );
                self.record_history(snapshot.clone()).await;
                Ok(snapshot)
            }
            Err(e) => {
                warn!("Snapshot load failed: {}", e);
                Err(Error::Collect(e.to_string()))
            }
        }
    }

    async fn record_history(&self, snapshot: Arc<Snapshot>) {
        let Some(history) = self.history.clone() else {
            return;
        };

        let task = tokio::task::spawn_blocking(move || history.log(&snapshot));
        let outcome = match tokio::time::timeout(self.log_wait, task).await {
            Ok(Ok(true)) => LogOutcome::Written,
            Ok(Ok(false)) => LogOutcome::Failed,
            Ok(Err(e)) => {
                warn!("History logging task failed: {}", e);
                LogOutcome::Failed
            }
            Err(_) => LogOutcome::TimedOut,
        };

        match outcome {
            LogOutcome::Written => debug!("History logged"),
            LogOutcome::Failed => warn!("History logging failed this cycle"),
            LogOutcome::TimedOut => warn!(
                "History logging did not finish within {}s",
                self.log_wait.as_secs()
            ),
        }
        *self.last_log.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::SegmentRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(15 * 60);

    /// Counts calls; optionally slow, optionally failing the first `fail_first` calls.
    struct FakeCollector {
        calls: AtomicUsize,
        delay: Duration,
        fail_first: usize,
        entries: Vec<(u32, SegmentRecord)>,
    }

    impl FakeCollector {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail_first: 0,
                entries: vec![(101, SegmentRecord::new(42))],
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing_first(mut self, n: usize) -> Self {
            self.fail_first = n;
            self
        }

        fn returning(mut self, entries: Vec<(u32, SegmentRecord)>) -> Self {
            self.entries = entries;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotCollector for FakeCollector {
        async fn collect(&self) -> Result<Snapshot> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call < self.fail_first {
                return Err(Error::Feed("upstream unavailable".into()));
            }
            let mut snapshot = Snapshot::new();
            for (id, record) in &self.entries {
                snapshot.insert(*id, record.clone())?;
            }
            Ok(snapshot)
        }
    }

    fn cache_over(collector: &Arc<FakeCollector>) -> Arc<RefreshCache> {
        let dyn_collector: Arc<dyn SnapshotCollector> = collector.clone();
        Arc::new(RefreshCache::new(dyn_collector, TTL))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cold_reads_load_once() {
        let collector = Arc::new(FakeCollector::new().slow(Duration::from_millis(200)));
        let cache = cache_over(&collector);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.retrieve().await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().expect("load should succeed"));
        }

        assert_eq!(collector.calls(), 1);
        assert!(results.iter().all(|s| Arc::ptr_eq(s, &results[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let collector = Arc::new(FakeCollector::new());
        let cache = cache_over(&collector);

        let first = cache.retrieve().await.unwrap();

        tokio::time::advance(Duration::from_secs(14 * 60 + 59)).await;
        let second = cache.retrieve().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(collector.calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let third = cache.retrieve().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(collector.calls(), 2);
    }

    #[tokio::test]
    async fn test_first_force_reloads_warm_cache() {
        let collector = Arc::new(FakeCollector::new());
        let cache = cache_over(&collector);

        let warm = cache.retrieve().await.unwrap();
        let forced = cache.force().await.unwrap();

        assert_eq!(collector.calls(), 2);
        assert!(!Arc::ptr_eq(&warm, &forced));
    }

    #[tokio::test]
    async fn test_back_to_back_forces_reload_once() {
        let collector = Arc::new(FakeCollector::new());
        let cache = cache_over(&collector);

        let first = cache.force().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let second = cache.force().await.unwrap();

        assert_eq!(collector.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let collector = Arc::new(FakeCollector::new().failing_first(1));
        let cache = cache_over(&collector);

        let err = cache.retrieve().await.unwrap_err();
        assert!(matches!(err, Error::Collect(_)));
        assert!(err.to_string().contains("upstream unavailable"));

        let snapshot = cache.retrieve().await.expect("next call should load again");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(collector.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_share_a_failed_load() {
        let collector = Arc::new(
            FakeCollector::new()
                .slow(Duration::from_millis(200))
                .failing_first(1),
        );
        let cache = cache_over(&collector);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.retrieve().await })
            })
            .collect();

        for handle in handles {
            assert!(matches!(handle.await.unwrap(), Err(Error::Collect(_))));
        }
        assert_eq!(collector.calls(), 1);
    }

    #[tokio::test]
    async fn test_load_logs_history_and_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Arc::new(FakeCollector::new().returning(vec![
            (101, SegmentRecord::new(42)),
            (102, SegmentRecord::new(17).with_incident("X-Y-Z")),
        ]));
        let history = Arc::new(HistoryLogger::new(dir.path(), vec![101, 102]));
        let dyn_collector: Arc<dyn SnapshotCollector> = collector.clone();
        let cache = RefreshCache::new(dyn_collector, TTL).with_history(history, Duration::from_secs(10));

        let snapshot = cache.retrieve().await.unwrap();

        assert_eq!(
            serde_json::to_string(snapshot.as_ref()).unwrap(),
            r#"[["Seg101","42"],["Seg102","17-X-Y-Z"]]"#
        );
        assert_eq!(cache.last_log_outcome(), Some(LogOutcome::Written));

        let now = chrono::Local::now();
        for (index, speed) in [42, 17].iter().enumerate() {
            let path = crate::history::file_path(dir.path(), &crate::history::file_key(&now, index));
            let body = std::fs::read_to_string(path).unwrap();
            let lines: Vec<&str> = body.lines().collect();
            assert_eq!(lines.len(), 2);
            assert!(lines[1].ends_with(&format!(",{}", speed)));
        }
    }

    #[tokio::test]
    async fn test_logging_failure_does_not_fail_load() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Arc::new(FakeCollector::new());
        // Configured layout differs from what the collector returns.
        let history = Arc::new(HistoryLogger::new(dir.path(), vec![1, 2]));
        let dyn_collector: Arc<dyn SnapshotCollector> = collector.clone();
        let cache = RefreshCache::new(dyn_collector, TTL).with_history(history, Duration::from_secs(10));

        let snapshot = cache.retrieve().await.expect("load should still succeed");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(cache.last_log_outcome(), Some(LogOutcome::Failed));
    }

    #[tokio::test]
    async fn test_slow_logging_times_out_without_failing_load() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Arc::new(FakeCollector::new());
        let history = Arc::new(HistoryLogger::new(dir.path(), vec![101]));
        let dyn_collector: Arc<dyn SnapshotCollector> = collector.clone();
        let cache = RefreshCache::new(dyn_collector, TTL)
            .with_history(history.clone(), Duration::from_millis(50));

        let held = history.hold_write_lock();
        let started = std::time::Instant::now();
        let snapshot = cache.retrieve().await.expect("load should still succeed");
        let waited = started.elapsed();
        drop(held);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(cache.last_log_outcome(), Some(LogOutcome::TimedOut));
        assert!(waited < Duration::from_secs(5), "waited {:?}", waited);
    }
}
