//! Rate limit rules, GCRA evaluation and aggregation.

pub(crate) mod gcra;
mod key;
mod limit;
mod limiter;

pub use key::StoreKey;
pub use limit::{RateLimit, SkipPredicate};
pub use limiter::{Decision, LimiterSettings, RateLimiter};
