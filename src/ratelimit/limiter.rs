//! Limit aggregation and the public evaluation entrypoint.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::key::StoreKey;
use super::limit::{RateLimit, SkipPredicate};
use crate::config::{LimiterConfig, StoreConfig};
use crate::error::{RateKeeperError, Result};
use crate::store::{MemoryStore, RateLimitStore, RedisStore, StoreDecision};

/// The outcome of evaluating one event against a set of limits.
///
/// Produced fresh per evaluation and never persisted. `remaining`,
/// `reset_at` and `limit` describe the most restrictive limit actually
/// evaluated and are intended for rate-limit disclosure headers;
/// `retry_after_seconds` is the retry hint for denials. When no limit was
/// evaluated at all (disabled limiter, global exemption, every limit
/// skipped, or an empty limit list) `limit` is zero and the header fields
/// carry no information.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the event is allowed.
    pub allowed: bool,
    /// Whole seconds until a retry would be allowed. Always rounded up,
    /// never down. Zero when allowed.
    pub retry_after_seconds: u64,
    /// The count of the most restrictive evaluated limit, or of the
    /// violated one on denial. Zero if no limit was evaluated.
    pub limit: u32,
    /// Estimated events left under the most restrictive evaluated limit.
    pub remaining: u64,
    /// When the most restrictive limit's schedule fully resets.
    pub reset_at: DateTime<Utc>,
    /// The limit that caused the denial, if any.
    pub violated_limit: Option<RateLimit>,
}

impl Decision {
    /// An allowed decision for an event that touched no store state.
    fn bypass(now: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            retry_after_seconds: 0,
            limit: 0,
            remaining: 0,
            reset_at: now,
            violated_limit: None,
        }
    }

    fn denied(limit: &RateLimit, store: &StoreDecision, now_secs: f64) -> Self {
        let retry_after = store.retry_after.max(0.0);
        Self {
            allowed: false,
            // Hard invariant: round up to the next whole second.
            retry_after_seconds: retry_after.ceil() as u64,
            limit: limit.count(),
            remaining: 0,
            reset_at: from_epoch_secs(now_secs + retry_after),
            violated_limit: Some(limit.clone()),
        }
    }
}

/// Settings for a [`RateLimiter`], supplied at construction.
#[derive(Clone)]
pub struct LimiterSettings {
    /// Master switch: when false, every evaluation is allowed without
    /// touching the store.
    pub enabled: bool,
    /// Prefix for all composite store keys.
    pub key_prefix: String,
    /// Limits applied to every event, after the caller-supplied ones.
    pub default_limits: Vec<RateLimit>,
    /// Fallback skip predicate for limits that carry none of their own.
    pub skip_function: Option<SkipPredicate>,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: "ratekeeper".to_string(),
            default_limits: Vec::new(),
            skip_function: None,
        }
    }
}

impl fmt::Debug for LimiterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimiterSettings")
            .field("enabled", &self.enabled)
            .field("key_prefix", &self.key_prefix)
            .field("default_limits", &self.default_limits)
            .field("has_skip_function", &self.skip_function.is_some())
            .finish()
    }
}

/// The limit aggregator.
///
/// Holds no per-event state of its own: all cross-call state lives in the
/// store, which is the sole point of required atomicity. Safe to share
/// across tasks behind an `Arc`.
pub struct RateLimiter {
    settings: LimiterSettings,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    /// Create a rate limiter over the given store.
    pub fn new(settings: LimiterSettings, store: Arc<dyn RateLimitStore>) -> Self {
        Self { settings, store }
    }

    /// Create a rate limiter with default settings and an in-process store.
    pub fn in_memory() -> Self {
        Self::new(LimiterSettings::default(), Arc::new(MemoryStore::new()))
    }

    /// Build a rate limiter from configuration, connecting the configured
    /// store.
    pub async fn from_config(config: &LimiterConfig) -> Result<Self> {
        let store: Arc<dyn RateLimitStore> = match &config.store {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            StoreConfig::Redis { url } => Arc::new(RedisStore::connect(url).await?),
        };

        let settings = LimiterSettings {
            enabled: config.enabled,
            key_prefix: config.key_prefix.clone(),
            default_limits: config.default_limits()?,
            skip_function: None,
        };

        Ok(Self::new(settings, store))
    }

    /// The store this limiter evaluates against.
    pub fn store(&self) -> &Arc<dyn RateLimitStore> {
        &self.store
    }

    /// Evaluate one event for `subject_key` against `limits` (followed by
    /// the configured default limits), in order.
    ///
    /// Evaluation short-circuits on the first denial; limits after it are
    /// neither checked nor consumed. If every limit allows, the returned
    /// decision carries the most restrictive limit's accounting fields.
    /// Store connectivity failures and skip-predicate failures propagate
    /// as errors; they are never turned into an allow or deny.
    pub async fn evaluate_event(
        &self,
        subject_key: &str,
        limits: &[RateLimit],
        now: DateTime<Utc>,
        global_exempt: bool,
    ) -> Result<Decision> {
        if !self.settings.enabled || global_exempt {
            trace!(
                subject = subject_key,
                exempt = global_exempt,
                "Rate limit evaluation bypassed"
            );
            return Ok(Decision::bypass(now));
        }

        let now_secs = epoch_secs(now);
        let mut tightest: Option<(u64, &RateLimit, f64)> = None;

        for limit in limits.iter().chain(self.settings.default_limits.iter()) {
            if self.should_skip(limit).await? {
                trace!(
                    subject = subject_key,
                    count = limit.count(),
                    period_secs = limit.period_secs(),
                    "Limit skipped for this event"
                );
                continue;
            }

            let key = StoreKey::new(&self.settings.key_prefix, limit, subject_key);
            let decision = self
                .store
                .compute_and_set(key.as_str(), limit, now_secs)
                .await?;

            if !decision.allowed {
                debug!(
                    subject = subject_key,
                    count = limit.count(),
                    period_secs = limit.period_secs(),
                    name = limit.name().unwrap_or(""),
                    "Rate limit exceeded"
                );
                return Ok(Decision::denied(limit, &decision, now_secs));
            }

            let remaining = remaining_count(limit, now_secs, decision.tat);
            if tightest.map_or(true, |(r, _, _)| remaining < r) {
                tightest = Some((remaining, limit, decision.tat));
            }
        }

        match tightest {
            Some((remaining, limit, tat)) => Ok(Decision {
                allowed: true,
                retry_after_seconds: 0,
                limit: limit.count(),
                remaining,
                reset_at: from_epoch_secs(tat),
                violated_limit: None,
            }),
            None => Ok(Decision::bypass(now)),
        }
    }

    /// Resolve whether `limit` is skipped for the current event. The
    /// predicate runs fresh every time; its errors abort the evaluation.
    async fn should_skip(&self, limit: &RateLimit) -> Result<bool> {
        let predicate = limit
            .skip_function()
            .or(self.settings.skip_function.as_ref());
        match predicate {
            None => Ok(false),
            Some(predicate) => predicate().await.map_err(RateKeeperError::Skip),
        }
    }
}

/// Events left before `limit` denies, given its post-call TAT.
fn remaining_count(limit: &RateLimit, now: f64, tat: f64) -> u64 {
    let separation = tat - now;
    let remaining = (limit.period_secs() - separation) / limit.emission_interval();
    remaining.max(0.0).floor() as u64
}

fn epoch_secs(when: DateTime<Utc>) -> f64 {
    when.timestamp_micros() as f64 / 1e6
}

fn from_epoch_secs(secs: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros((secs * 1e6).round() as i64)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
