use crate::types::RateLimitDecision;
use chrono::{Duration, Utc};
use redis::RedisResult;

/// Redis key semantics for the shared rate limiter.
/// Every API process uses the same key layout so windows are shared
/// across a multi-process deployment.

pub const RATE_LIMIT_PREFIX: &str = "skyforge:ratelimit";

/// Fixed-window hit. The read-compare-increment runs as one script so
/// concurrent API processes never double count. The window reset time is
/// the key's expiry.
///
/// KEYS[1] = window key, ARGV[1] = window length ms, ARGV[2] = max hits
/// Returns {allowed, count, pttl}
const FIXED_WINDOW_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local allowed = 0
if current < tonumber(ARGV[2]) then
  current = redis.call('INCR', KEYS[1])
  allowed = 1
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return {allowed, current, ttl}
"#;

/// Generate deterministic rate-limit key for a client
pub fn rate_limit_key(client_key: &str) -> String {
    format!("{}:{}", RATE_LIMIT_PREFIX, client_key)
}

/// Count one request for `client_key` and decide whether it is accepted
pub async fn hit_rate_limit(
    conn: &mut redis::aio::ConnectionManager,
    client_key: &str,
    max_requests: u32,
    window_ms: u64,
) -> RedisResult<RateLimitDecision> {
    let key = rate_limit_key(client_key);
    let (allowed, count, ttl_ms): (i64, i64, i64) = redis::Script::new(FIXED_WINDOW_SCRIPT)
        .key(&key)
        .arg(window_ms)
        .arg(max_requests)
        .invoke_async(conn)
        .await?;

    Ok(RateLimitDecision {
        allowed: allowed == 1,
        count: count.max(0) as u32,
        window_reset_at: Utc::now() + Duration::milliseconds(ttl_ms.max(0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key_format() {
        assert_eq!(rate_limit_key("10.0.0.7"), "skyforge:ratelimit:10.0.0.7");
    }

    #[test]
    fn test_rate_limit_key_deterministic() {
        assert_eq!(rate_limit_key("::1"), rate_limit_key("::1"));
        assert_ne!(rate_limit_key("a"), rate_limit_key("b"));
    }

    /// Requires a Redis instance on localhost
    #[tokio::test]
    #[ignore]
    async fn test_fixed_window_against_live_redis() {
        let client = redis::Client::open("redis://127.0.0.1:6379").unwrap();
        let mut conn = redis::aio::ConnectionManager::new(client).await.unwrap();
        let client_key = format!("test-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());

        for expected in 1..=3 {
            let decision = hit_rate_limit(&mut conn, &client_key, 3, 60_000).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.count, expected);
        }
        let rejected = hit_rate_limit(&mut conn, &client_key, 3, 60_000).await.unwrap();
        assert!(!rejected.allowed);
        assert_eq!(rejected.count, 3);
    }
}
