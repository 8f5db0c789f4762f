// Fixed-window rate limiting per client key
//
// Each client gets `max_requests` accepted runs per window. A rejected
// request does not count against the window.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use skyforge_common::redis as store;
use skyforge_common::types::RateLimitDecision;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request for `client_key` and decide whether it may proceed
    async fn hit(&self, client_key: &str) -> anyhow::Result<RateLimitDecision>;
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: DateTime<Utc>,
}

/// Process-local table. Entries are never evicted; an expired entry is
/// simply reset on the client's next request.
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    max_requests: u32,
    window: Duration,
}

impl MemoryRateLimitStore {
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_requests,
            window: Duration::milliseconds(window_ms as i64),
        }
    }

    pub fn hit_at(&self, client_key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        match entries.get_mut(client_key) {
            Some(entry) if now < entry.window_reset_at => {
                let allowed = entry.count < self.max_requests;
                if allowed {
                    entry.count += 1;
                }
                RateLimitDecision {
                    allowed,
                    count: entry.count,
                    window_reset_at: entry.window_reset_at,
                }
            }
            _ => {
                let entry = RateLimitEntry {
                    count: 1,
                    window_reset_at: now + self.window,
                };
                let decision = RateLimitDecision {
                    allowed: self.max_requests > 0,
                    count: entry.count,
                    window_reset_at: entry.window_reset_at,
                };
                entries.insert(client_key.to_string(), entry);
                decision
            }
        }
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(&self, client_key: &str) -> anyhow::Result<RateLimitDecision> {
        Ok(self.hit_at(client_key, Utc::now()))
    }
}

/// Shared across API processes; the window lives in the key's TTL
pub struct RedisRateLimitStore {
    conn: ConnectionManager,
    max_requests: u32,
    window_ms: u64,
}

impl RedisRateLimitStore {
    pub fn new(conn: ConnectionManager, max_requests: u32, window_ms: u64) -> Self {
        Self {
            conn,
            max_requests,
            window_ms,
        }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, client_key: &str) -> anyhow::Result<RateLimitDecision> {
        let mut conn = self.conn.clone();
        store::hit_rate_limit(&mut conn, client_key, self.max_requests, self.window_ms)
            .await
            .context("rate limit lookup failed")
    }
}
