use clap::{Parser, ValueEnum};
use std::time::Duration;
use tracing::warn;

use crate::admission::{Limits, PrivilegedTokens};
use crate::completion::CompletionSettings;
use crate::quota::{DurableSettings, WINDOW};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

// CLI argument structure, every option can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "tools-gateway")]
#[command(about = "Quota-gated gateway for LLM-backed tools")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Upstash Redis REST endpoint; together with the token enables durable counters
    #[arg(long, env = "UPSTASH_REDIS_REST_URL")]
    pub redis_url: Option<String>,

    #[arg(long, env = "UPSTASH_REDIS_REST_TOKEN", hide_env_values = true)]
    pub redis_token: Option<String>,

    // Per-call timeout for the durable store in milliseconds
    #[arg(long, env = "QUOTA_STORE_TIMEOUT_MS", default_value_t = 2000)]
    pub store_timeout_ms: u64,

    // VIP API keys (comma-separated), exempt from quota
    #[arg(long, env = "VIP_API_KEYS", default_value = "", hide_env_values = true)]
    pub vip_api_keys: String,

    // Requests per client per 24h window
    #[arg(long, env = "RATE_LIMIT_PER_IDENTITY", default_value_t = 3)]
    pub identity_limit: u32,

    // Requests for the whole service per UTC day
    #[arg(long, env = "RATE_LIMIT_GLOBAL_DAILY", default_value_t = 10_000)]
    pub global_limit: u32,

    // Sweep interval for the in-memory counters in seconds (at most half a window)
    #[arg(
        long,
        env = "QUOTA_SWEEP_INTERVAL_SECS",
        default_value_t = 3600,
        value_parser = clap::value_parser!(u64).range(1..=WINDOW.as_secs() / 2)
    )]
    pub sweep_interval: u64,

    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    pub openai_api_key: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    // Completion call timeout in seconds
    #[arg(long, env = "COMPLETION_TIMEOUT_SECS", default_value_t = 60)]
    pub completion_timeout: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    /// Durable store settings, when both URL and token are present.
    pub fn durable_settings(&self) -> Option<DurableSettings> {
        let url = self.redis_url.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let token = self.redis_token.as_deref().map(str::trim).filter(|s| !s.is_empty());

        match (url, token) {
            (Some(url), Some(token)) => Some(DurableSettings {
                url: url.to_string(),
                token: token.to_string(),
                timeout: Duration::from_millis(self.store_timeout_ms),
            }),
            (None, None) => None,
            _ => {
                warn!("Only one of UPSTASH_REDIS_REST_URL / UPSTASH_REDIS_REST_TOKEN is set, ignoring both");
                None
            }
        }
    }

    pub fn limits(&self) -> Limits {
        Limits {
            per_identity: self.identity_limit,
            global: self.global_limit,
        }
    }

    pub fn privileged_tokens(&self) -> PrivilegedTokens {
        PrivilegedTokens::from_list(&self.vip_api_keys)
    }

    pub fn completion_settings(&self) -> CompletionSettings {
        CompletionSettings {
            base_url: self.openai_base_url.clone(),
            api_key: self.openai_api_key.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.completion_timeout),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}
