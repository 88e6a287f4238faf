use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::{Duration, Instant, interval};
use tracing::debug;

use super::{QuotaKey, QuotaStore, StoreError, WINDOW};
use crate::metrics::FALLBACK_ENTRIES;

// Counter entry - count within the current window and when it lapses
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    reset_at: Instant,
}

/// Process-local quota counters.
///
/// Each `increment` runs under the dashmap shard lock for its key, so the
/// read-modify-write is atomic. `sweep` goes through the same map and
/// therefore the same locks.
#[derive(Debug, Default)]
pub struct MemoryQuotaStore {
    counters: DashMap<QuotaKey, CounterEntry>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment_at(&self, key: &QuotaKey, now: Instant) -> u64 {
        let mut entry = self.counters.entry(key.clone()).or_insert(CounterEntry {
            count: 0,
            reset_at: now + WINDOW,
        });

        // window lapsed? start over
        if now > entry.reset_at {
            *entry = CounterEntry {
                count: 0,
                reset_at: now + WINDOW,
            };
        }

        entry.count += 1;
        entry.count
    }

    /// Current count for `key`, or `None` when no entry is held.
    ///
    /// Lapsed entries that have not been swept yet still report their count.
    pub fn count(&self, key: &QuotaKey) -> Option<u64> {
        self.counters.get(key).map(|entry| entry.count)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drops every entry whose window has passed. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, entry| now <= entry.reset_at);
        let removed = before.saturating_sub(self.counters.len());
        FALLBACK_ENTRIES.set(self.counters.len() as f64);
        removed
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn increment(&self, key: &QuotaKey) -> Result<u64, StoreError> {
        let count = self.increment_at(key, Instant::now());
        FALLBACK_ENTRIES.set(self.counters.len() as f64);
        Ok(count)
    }
}

// Sweeper loop - bounds the map by evicting lapsed windows
pub async fn sweeper(store: Arc<MemoryQuotaStore>, every: Duration) {
    let mut interval = interval(every);

    debug!(interval = ?every, "Quota sweeper started");

    loop {
        interval.tick().await;

        let removed = store.sweep();
        debug!(removed, remaining = store.len(), "Swept lapsed quota counters");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ip: &str) -> QuotaKey {
        QuotaKey::identity(ip)
    }

    #[tokio::test(start_paused = true)]
    async fn counts_up_within_a_window() {
        let store = MemoryQuotaStore::new();
        for expected in 1..=5 {
            assert_eq!(store.increment(&key("10.0.0.1")).await.unwrap(), expected);
        }
        assert_eq!(store.count(&key("10.0.0.1")), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let store = MemoryQuotaStore::new();
        store.increment(&key("10.0.0.1")).await.unwrap();
        store.increment(&key("10.0.0.1")).await.unwrap();
        assert_eq!(store.increment(&key("10.0.0.2")).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_boundary_is_inclusive() {
        let store = MemoryQuotaStore::new();
        store.increment(&key("10.0.0.1")).await.unwrap();

        // exactly at reset_at the old window still holds
        tokio::time::advance(WINDOW).await;
        assert_eq!(store.increment(&key("10.0.0.1")).await.unwrap(), 2);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.increment(&key("10.0.0.1")).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_lapsed_entries() {
        let store = MemoryQuotaStore::new();
        store.increment(&key("old")).await.unwrap();

        tokio::time::advance(Duration::from_secs(12 * 60 * 60)).await;
        store.increment(&key("new")).await.unwrap();

        tokio::time::advance(Duration::from_secs(12 * 60 * 60 + 1)).await;
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.count(&key("old")), None);
        assert_eq!(store.count(&key("new")), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_evicts_on_its_interval() {
        let store = Arc::new(MemoryQuotaStore::new());
        store.increment(&key("abandoned")).await.unwrap();

        let handle = tokio::spawn(sweeper(store.clone(), Duration::from_secs(3600)));

        // first tick fires immediately, nothing lapsed yet
        tokio::task::yield_now().await;
        assert_eq!(store.len(), 1);

        tokio::time::sleep(WINDOW + Duration::from_secs(2 * 3600)).await;
        tokio::task::yield_now().await;
        assert!(store.is_empty());

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_increments_hand_out_distinct_counts() {
        let store = Arc::new(MemoryQuotaStore::new());
        let mut tasks = Vec::new();
        for _ in 0..64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.increment(&QuotaKey::identity("shared")).await.unwrap()
            }));
        }

        let mut seen = Vec::new();
        for task in tasks {
            seen.push(task.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=64).collect::<Vec<u64>>());
    }
}
