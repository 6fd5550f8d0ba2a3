//! In-process TAT store.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{expiry_secs, RateLimitStore, StoreDecision};
use crate::error::Result;
use crate::ratelimit::gcra;
use crate::ratelimit::RateLimit;

/// A single-process store of TATs keyed by composite store key.
///
/// The map's entry guard covers the whole read-compute-write span, so
/// concurrent tasks evaluating the same key serialize correctly. Scope is
/// one process: independent processes each enforce the full limit on
/// their own, which is a documented limitation rather than a bug.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, TatEntry>,
}

#[derive(Debug, Clone, Copy)]
struct TatEntry {
    tat: f64,
    expires_at: f64,
}

impl MemoryStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all stored TATs. Primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of live entries, counting ones pending passive expiry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn compute_and_set(
        &self,
        key: &str,
        limit: &RateLimit,
        now: f64,
    ) -> Result<StoreDecision> {
        // The entry guard holds the shard lock for the full span; nothing
        // in here awaits.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                // Passive expiry: an expired entry reads as absent.
                let stored = if occupied.get().expires_at <= now {
                    None
                } else {
                    Some(occupied.get().tat)
                };
                let outcome = gcra::evaluate(limit, now, stored);
                if outcome.allowed {
                    occupied.insert(TatEntry {
                        tat: outcome.tat,
                        expires_at: now + expiry_secs(limit),
                    });
                }
                Ok(outcome.into())
            }
            Entry::Vacant(vacant) => {
                let outcome = gcra::evaluate(limit, now, None);
                if outcome.allowed {
                    vacant.insert(TatEntry {
                        tat: outcome.tat,
                        expires_at: now + expiry_secs(limit),
                    });
                }
                Ok(outcome.into())
            }
        }
    }

    async fn get_expiration(&self, key: &str) -> Result<Option<Duration>> {
        let now = unix_now();
        let remaining = self
            .entries
            .get(key)
            .map(|entry| entry.expires_at - now)
            .filter(|remaining| *remaining > 0.0);
        Ok(remaining.map(Duration::from_secs_f64))
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn limit(count: u32, period_secs: i64) -> RateLimit {
        RateLimit::new(count, ChronoDuration::seconds(period_secs)).unwrap()
    }

    #[tokio::test]
    async fn test_first_event_creates_entry() {
        let store = MemoryStore::new();
        let limit = limit(1, 10);

        let decision = store.compute_and_set("key", &limit, 100.0).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.tat, 110.0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_denial_does_not_mutate() {
        let store = MemoryStore::new();
        let limit = limit(1, 10);

        store.compute_and_set("key", &limit, 100.0).await.unwrap();
        let denied = store.compute_and_set("key", &limit, 101.0).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.tat, 110.0);

        // TAT unchanged: retrying at the reported time succeeds.
        let retried = store
            .compute_and_set("key", &limit, 101.0 + denied.retry_after)
            .await
            .unwrap();
        assert!(retried.allowed);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let store = MemoryStore::new();
        let limit = limit(1, 10);

        store.compute_and_set("key", &limit, 100.0).await.unwrap();
        // Past period + emission interval the entry no longer counts.
        let later = 100.0 + limit.period_secs() + limit.emission_interval() + 1.0;
        let decision = store.compute_and_set("key", &limit, later).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.tat, later + limit.emission_interval());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = MemoryStore::new();
        let limit = limit(1, 10);

        let a = store.compute_and_set("a", &limit, 100.0).await.unwrap();
        let b = store.compute_and_set("b", &limit, 100.0).await.unwrap();
        assert!(a.allowed);
        assert!(b.allowed);
    }

    #[tokio::test]
    async fn test_get_expiration_absent_key() {
        let store = MemoryStore::new();
        assert_eq!(store.get_expiration("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_expiration_live_key() {
        let store = MemoryStore::new();
        let limit = limit(1, 10);
        let now = unix_now();

        store.compute_and_set("key", &limit, now).await.unwrap();
        let ttl = store.get_expiration("key").await.unwrap();
        assert!(ttl.is_some());
        assert!(ttl.unwrap() <= Duration::from_secs_f64(expiry_secs(&limit)));
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();
        let limit = limit(1, 10);

        store.compute_and_set("key", &limit, 100.0).await.unwrap();
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
    }
}
