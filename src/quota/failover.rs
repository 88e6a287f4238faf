use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{MemoryQuotaStore, QuotaKey, QuotaStore, StoreError};
use crate::metrics::STORE_FALLBACKS;

/// Durable store with a per-call in-memory fallback.
///
/// A failed durable increment is retried once against the local map and the
/// local count is returned instead. Nothing is reconciled later; availability
/// wins over an exact shared count.
pub struct FailoverQuotaStore {
    durable: Arc<dyn QuotaStore>,
    fallback: Arc<MemoryQuotaStore>,
}

impl FailoverQuotaStore {
    pub fn new(durable: Arc<dyn QuotaStore>, fallback: Arc<MemoryQuotaStore>) -> Self {
        Self { durable, fallback }
    }
}

#[async_trait]
impl QuotaStore for FailoverQuotaStore {
    async fn increment(&self, key: &QuotaKey) -> Result<u64, StoreError> {
        match self.durable.increment(key).await {
            Ok(count) => Ok(count),
            Err(err) => {
                STORE_FALLBACKS.inc();
                warn!(key = %key, error = %err, "Durable quota store unavailable, counting in memory");
                self.fallback.increment(key).await
            }
        }
    }
}
