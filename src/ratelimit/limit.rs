//! Rate limit rule definition.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::{BoxError, RateKeeperError, Result};

/// A per-event predicate deciding whether a limit should be bypassed.
///
/// Evaluated fresh for every event, immediately before the limit would
/// otherwise be checked against the store. The lookup may suspend (e.g. a
/// session check) and is never retried or cached; a failure aborts the
/// whole evaluation rather than defaulting to "not skipped".
pub type SkipPredicate =
    Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<bool, BoxError>> + Send + Sync>;

/// An immutable rate limit rule: at most `count` events per `period`.
///
/// Each instance carries a unique discriminator, so two rules with
/// identical count and period applied to the same subject still track
/// separate state in the store.
#[derive(Clone)]
pub struct RateLimit {
    count: u32,
    period: Duration,
    name: Option<String>,
    id: Uuid,
    skip_function: Option<SkipPredicate>,
}

impl RateLimit {
    /// Create a new rate limit rule.
    ///
    /// Returns a configuration error if `count` is zero or `period` is not
    /// strictly positive.
    pub fn new(count: u32, period: Duration) -> Result<Self> {
        if count == 0 {
            return Err(RateKeeperError::Config(
                "rate limit count must be at least 1".to_string(),
            ));
        }
        if period <= Duration::zero() {
            return Err(RateKeeperError::Config(
                "rate limit period must be positive".to_string(),
            ));
        }

        Ok(Self {
            count,
            period,
            name: None,
            id: Uuid::new_v4(),
            skip_function: None,
        })
    }

    /// Attach a name to this rule, used in logs and configuration.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a skip predicate to this rule.
    pub fn with_skip_function(mut self, skip_function: SkipPredicate) -> Self {
        self.skip_function = Some(skip_function);
        self
    }

    /// Maximum number of events allowed per period.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// The period over which `count` events are allowed.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// The period in fractional seconds.
    pub fn period_secs(&self) -> f64 {
        self.period.num_milliseconds() as f64 / 1000.0
    }

    /// The GCRA emission interval: `period / count`, the minimum spacing
    /// between allowed events.
    pub fn emission_interval(&self) -> f64 {
        self.period_secs() / self.count as f64
    }

    /// The discriminator that makes this rule's store keys unique.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The rule's name, if one was set.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The rule's skip predicate, if one was set.
    pub fn skip_function(&self) -> Option<&SkipPredicate> {
        self.skip_function.as_ref()
    }
}

impl fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimit")
            .field("count", &self.count)
            .field("period", &self.period)
            .field("name", &self.name)
            .field("id", &self.id)
            .field("has_skip_function", &self.skip_function.is_some())
            .finish()
    }
}
