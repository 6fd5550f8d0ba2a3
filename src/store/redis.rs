//! Redis-backed TAT store.
//!
//! Persists TATs in Redis so multiple processes share one schedule per
//! key. Atomicity comes from an optimistic compare-and-set loop: the TAT
//! is read, the GCRA decision computed locally, and the new TAT written
//! through a server-side script that only commits if the stored value is
//! still the one that was read. A lost race re-reads and re-evaluates; the
//! loop is bounded and exhaustion is reported as a store failure, never as
//! an allow or deny.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::trace;

use super::{expiry_secs, RateLimitStore, StoreDecision};
use crate::error::{RateKeeperError, Result};
use crate::ratelimit::gcra;
use crate::ratelimit::RateLimit;

/// Upper bound on compare-and-set attempts per evaluation.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Commit the new TAT only if the stored value still matches the one read
/// by this evaluation (an absent value is encoded as the empty string).
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if (current == false and ARGV[1] == '') or current == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
    return 1
end
return 0
"#;

/// A Redis-backed store of TATs shared across processes.
pub struct RedisStore {
    connection: ConnectionManager,
    cas_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g. "redis://127.0.0.1/")
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            cas_script: Script::new(CAS_SCRIPT),
        })
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn compute_and_set(
        &self,
        key: &str,
        limit: &RateLimit,
        now: f64,
    ) -> Result<StoreDecision> {
        let mut conn = self.connection.clone();
        let expiry_ms = (expiry_secs(limit) * 1000.0).ceil() as u64;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let raw: Option<String> = conn.get(key).await?;
            // An unparseable value is treated as absent; the next allowed
            // event overwrites it.
            let stored = raw.as_deref().and_then(|value| value.parse::<f64>().ok());

            let outcome = gcra::evaluate(limit, now, stored);
            if !outcome.allowed {
                // A TAT only ever advances, so a denial computed from a
                // stale read still holds against the newer value.
                return Ok(outcome.into());
            }

            let committed: i64 = self
                .cas_script
                .key(key)
                .arg(raw.unwrap_or_default())
                .arg(outcome.tat.to_string())
                .arg(expiry_ms)
                .invoke_async(&mut conn)
                .await?;

            if committed == 1 {
                return Ok(outcome.into());
            }

            trace!(key, attempt, "TAT changed concurrently, retrying compare-and-set");
        }

        Err(RateKeeperError::RetryExhausted {
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    async fn get_expiration(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.connection.clone();
        let ttl_ms: i64 = conn.pttl(key).await?;
        // -2: key missing, -1: no expiry set.
        if ttl_ms < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_millis(ttl_ms as u64)))
        }
    }
}

// These tests require a Redis instance at redis://127.0.0.1/ and are
// ignored by default: `cargo test -- --ignored` with a local server up.
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_key(test: &str) -> String {
        format!("ratekeeper-test:{}:{}", test, uuid::Uuid::new_v4())
    }

    fn unix_now() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs_f64()
    }

    #[tokio::test]
    #[ignore]
    async fn test_exactness_against_live_redis() {
        let store = RedisStore::connect("redis://127.0.0.1/").await.unwrap();
        let limit = RateLimit::new(3, ChronoDuration::seconds(30)).unwrap();
        let key = unique_key("exactness");
        let now = unix_now();

        for _ in 0..3 {
            let decision = store.compute_and_set(&key, &limit, now).await.unwrap();
            assert!(decision.allowed);
        }

        let denied = store.compute_and_set(&key, &limit, now).await.unwrap();
        assert!(!denied.allowed);
        assert!((denied.retry_after - limit.emission_interval()).abs() < 1e-6);
    }

    #[tokio::test]
    #[ignore]
    async fn test_expiry_is_set_on_write() {
        let store = RedisStore::connect("redis://127.0.0.1/").await.unwrap();
        let limit = RateLimit::new(1, ChronoDuration::seconds(10)).unwrap();
        let key = unique_key("expiry");

        store
            .compute_and_set(&key, &limit, unix_now())
            .await
            .unwrap();

        let ttl = store.get_expiration(&key).await.unwrap();
        assert!(ttl.is_some());
        assert!(ttl.unwrap() <= Duration::from_secs_f64(expiry_secs(&limit)));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore]
    async fn test_concurrent_callers_admit_exactly_one() {
        let store = Arc::new(RedisStore::connect("redis://127.0.0.1/").await.unwrap());
        let limit = RateLimit::new(1, ChronoDuration::seconds(60)).unwrap();
        let key = unique_key("concurrency");
        let now = unix_now();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let limit = limit.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                store.compute_and_set(&key, &limit, now).await.unwrap()
            }));
        }

        let mut allowed = 0;
        for task in tasks {
            if task.await.unwrap().allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 1);
    }
}
