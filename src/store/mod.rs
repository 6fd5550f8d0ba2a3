//! Pluggable TAT persistence.
//!
//! The store owns all cross-call state: one theoretical arrival time per
//! composite key. Its `compute_and_set` combines the TAT read, the GCRA
//! calculation and (on allow) the TAT write into a single atomic operation,
//! so concurrent evaluations of the same key can never both consume the
//! same slot.

mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::ratelimit::gcra::Gcra;
use crate::ratelimit::RateLimit;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Outcome of an atomic `compute_and_set` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreDecision {
    /// Whether the event was allowed.
    pub allowed: bool,
    /// The TAT after the call: the newly written value on allow, the
    /// unchanged stored value on deny. Fractional seconds since the Unix
    /// epoch.
    pub tat: f64,
    /// Exact fractional seconds until a retry would be allowed; zero on
    /// allow.
    pub retry_after: f64,
}

impl From<Gcra> for StoreDecision {
    fn from(outcome: Gcra) -> Self {
        Self {
            allowed: outcome.allowed,
            tat: outcome.tat,
            retry_after: outcome.retry_after,
        }
    }
}

/// Trait for TAT store implementations.
///
/// This trait abstracts over the in-process `MemoryStore` and the
/// networked `RedisStore` so the aggregator works with either. Both
/// operations may suspend; neither may be split into separate read and
/// write calls by a caller.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically read the stored TAT for `key`, evaluate `limit` at `now`
    /// (fractional seconds since the Unix epoch) and, when allowed, write
    /// the advanced TAT back with a fresh expiry.
    ///
    /// A connectivity failure is returned as an error, never interpreted
    /// as a decision.
    async fn compute_and_set(&self, key: &str, limit: &RateLimit, now: f64)
        -> Result<StoreDecision>;

    /// Remaining time-to-live for `key`, if the key exists and carries an
    /// expiry. Diagnostics only; never decision-critical.
    async fn get_expiration(&self, key: &str) -> Result<Option<Duration>>;
}

/// Seconds to keep a TAT around: a value older than `period + emission
/// interval` is indistinguishable from an absent one.
pub(crate) fn expiry_secs(limit: &RateLimit) -> f64 {
    limit.period_secs() + limit.emission_interval()
}
