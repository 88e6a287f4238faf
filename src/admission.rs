// Tool admission - global day counter first, then per client; VIP keys skip both

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::metrics::ADMISSIONS;
use crate::quota::{QuotaKey, QuotaStore};

pub const PRIVILEGED_REMAINING: u32 = 999;

pub const UNKNOWN_CLIENT: &str = "unknown";

pub const API_KEY_HEADER: &str = "x-api-key";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub remaining: u32,
}

impl AdmissionDecision {
    fn deny() -> Self {
        Self {
            allowed: false,
            remaining: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub per_identity: u32,
    pub global: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            per_identity: 3,
            global: 10_000,
        }
    }
}

// VIP keys, held as sha256 digests
#[derive(Debug, Clone, Default)]
pub struct PrivilegedTokens {
    digests: HashSet<[u8; 32]>,
}

impl PrivilegedTokens {
    // comma separated, blanks ignored
    pub fn from_list(list: &str) -> Self {
        let digests = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(digest)
            .collect();
        Self { digests }
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    // short digest prefix for logs
    fn recognize(&self, token: &str) -> Option<String> {
        let d = digest(token);
        if self.digests.contains(&d) {
            Some(d[..4].iter().map(|b| format!("{b:02x}")).collect())
        } else {
            None
        }
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Privileged { fingerprint: String },
    Client(String),
}

impl Identity {
    /// A VIP key in the header or the `api_key` query parameter wins,
    /// otherwise the request is charged to its client address.
    pub fn from_request(
        headers: &HeaderMap,
        api_key_param: Option<&str>,
        tokens: &PrivilegedTokens,
    ) -> Self {
        let header_key = header_str(headers, API_KEY_HEADER);
        for candidate in [header_key, api_key_param].into_iter().flatten() {
            if let Some(fingerprint) = tokens.recognize(candidate) {
                return Identity::Privileged { fingerprint };
            }
        }

        Identity::Client(client_address(headers))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// First forwarded-for hop, else the real-ip header, else `"unknown"`.
pub fn client_address(headers: &HeaderMap) -> String {
    let forwarded = header_str(headers, FORWARDED_FOR_HEADER)
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let real_ip = header_str(headers, REAL_IP_HEADER)
        .map(str::trim)
        .filter(|s| !s.is_empty());

    forwarded
        .or(real_ip)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

#[derive(Clone)]
pub struct AdmissionController {
    store: Arc<dyn QuotaStore>,
    tokens: PrivilegedTokens,
    limits: Limits,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn QuotaStore>, tokens: PrivilegedTokens, limits: Limits) -> Self {
        Self {
            store,
            tokens,
            limits,
        }
    }

    pub fn tokens(&self) -> &PrivilegedTokens {
        &self.tokens
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub async fn check(&self, identity: &Identity) -> AdmissionDecision {
        self.check_on(identity, Utc::now().date_naive()).await
    }

    pub async fn check_on(&self, identity: &Identity, day: NaiveDate) -> AdmissionDecision {
        let client = match identity {
            Identity::Privileged { fingerprint } => {
                ADMISSIONS.with_label_values(&["privileged"]).inc();
                debug!(%fingerprint, "VIP key, bypassing quota");
                return AdmissionDecision {
                    allowed: true,
                    remaining: PRIVILEGED_REMAINING,
                };
            }
            Identity::Client(client) => client,
        };

        let global = self.charge(&QuotaKey::global(day)).await;
        if global > u64::from(self.limits.global) {
            ADMISSIONS.with_label_values(&["denied_global"]).inc();
            info!(client = %client, count = global, limit = self.limits.global, "Global daily quota exhausted");
            return AdmissionDecision::deny();
        }

        let used = self.charge(&QuotaKey::identity(client)).await;
        if used > u64::from(self.limits.per_identity) {
            ADMISSIONS.with_label_values(&["denied_identity"]).inc();
            info!(client = %client, count = used, limit = self.limits.per_identity, "Client daily quota exhausted");
            return AdmissionDecision::deny();
        }

        ADMISSIONS.with_label_values(&["allowed"]).inc();
        // used <= per_identity here, so the cast is lossless
        AdmissionDecision {
            allowed: true,
            remaining: self.limits.per_identity - used as u32,
        }
    }

    // An Err only comes from a durable store wired without failover; such a
    // call is admitted uncharged.
    async fn charge(&self, key: &QuotaKey) -> u64 {
        match self.store.increment(key).await {
            Ok(count) => count,
            Err(err) => {
                error!(key = %key, error = %err, "Quota store failed without fallback, admitting");
                0
            }
        }
    }
}
