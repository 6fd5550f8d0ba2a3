//! Pure GCRA (Generic Cell Rate Algorithm) decision math.
//!
//! GCRA tracks a single theoretical arrival time (TAT) per key instead of
//! counters or sliding windows. An event is allowed if the stored TAT does
//! not project more than one full period (less one emission interval) past
//! the current time. All arithmetic is in fractional seconds since the Unix
//! epoch; callers must never feed naive local-time values in here.
//!
//! This module is pure computation. Reading the previous TAT and writing
//! the new one belong to the store, which must make the whole
//! read-compute-write span atomic per key.

use super::limit::RateLimit;

/// Outcome of a single GCRA evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Gcra {
    /// Whether the event conforms to the limit.
    pub allowed: bool,
    /// The TAT after this evaluation: advanced by one emission interval if
    /// allowed, unchanged if denied.
    pub tat: f64,
    /// Seconds until a retry would be allowed. Zero when allowed. Exact
    /// fractional value; rounding up to whole seconds happens at the
    /// decision boundary.
    pub retry_after: f64,
}

/// Evaluate one event against `limit` at time `now` given the stored TAT.
///
/// An absent TAT means no backlog and is treated as `now`.
pub(crate) fn evaluate(limit: &RateLimit, now: f64, stored: Option<f64>) -> Gcra {
    let tat = stored.unwrap_or(now).max(now);
    let separation = tat - now;
    let max_interval = limit.period_secs() - limit.emission_interval();

    if separation > max_interval {
        Gcra {
            allowed: false,
            tat,
            retry_after: separation - max_interval,
        }
    } else {
        Gcra {
            allowed: true,
            tat: tat + limit.emission_interval(),
            retry_after: 0.0,
        }
    }
}
