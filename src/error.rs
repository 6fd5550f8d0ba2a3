//! Error types for the Ratekeeper library.

use thiserror::Error;

/// Errors produced by skip predicates and other user-supplied callables.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for Ratekeeper operations.
#[derive(Error, Debug)]
pub enum RateKeeperError {
    /// Configuration-related errors, including invalid limit definitions
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backing store is unreachable or a transaction could not complete
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// A per-limit skip predicate failed
    #[error("Skip predicate failed: {0}")]
    Skip(#[source] BoxError),

    /// The store's optimistic compare-and-set loop hit its attempt bound.
    /// Reported as a connectivity-class failure, never as a decision.
    #[error("Store contention not resolved after {attempts} attempts")]
    RetryExhausted { attempts: usize },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratekeeper operations.
pub type Result<T> = std::result::Result<T, RateKeeperError>;
