mod failover;
mod memory;
mod upstash;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{info, warn};

pub use failover::FailoverQuotaStore;
pub use memory::{MemoryQuotaStore, sweeper};
pub use upstash::UpstashQuotaStore;

// counter lifetime from its first increment
pub const WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

// Any variant means the durable store could not answer this call
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("quota store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("quota store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("quota store rejected {command}: {message}")]
    Backend { command: &'static str, message: String },

    #[error("quota store sent an unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: &'static str, reply: String },
}

// Counter service - increment returns the new count, and a new key
// expires WINDOW after its first increment
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn increment(&self, key: &QuotaKey) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaKey(String);

impl QuotaKey {
    pub fn global(day: NaiveDate) -> Self {
        Self(format!("global:{}", day.format("%Y-%m-%d")))
    }

    pub fn identity(client: &str) -> Self {
        Self(format!("identity:{client}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QuotaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct DurableSettings {
    pub url: String,
    pub token: String,
    pub timeout: Duration,
}

/// Redis with a per-call memory fallback when durable settings are given,
/// otherwise `memory` alone.
pub fn build_store(
    durable: Option<DurableSettings>,
    memory: Arc<MemoryQuotaStore>,
) -> Result<Arc<dyn QuotaStore>, StoreError> {
    match durable {
        Some(settings) => {
            info!(url = %settings.url, "Quota store: Upstash Redis with in-memory fallback");
            let durable = UpstashQuotaStore::new(&settings.url, &settings.token, settings.timeout)?;
            Ok(Arc::new(FailoverQuotaStore::new(Arc::new(durable), memory)))
        }
        None => {
            warn!("Quota store: in-memory only, counters are per-process and reset on restart");
            Ok(memory)
        }
    }
}
