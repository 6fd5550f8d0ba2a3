//! Composite store key construction.

use super::limit::RateLimit;

/// The key under which one (subject, limit) pair's TAT is persisted.
///
/// Composed as `{prefix}:{limit id}:{subject}`, in that fixed order. The
/// limit's discriminator is a UUID, so two distinct limits never collide
/// for the same subject and a limit segment can never alias into a
/// subject string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey(String);

impl StoreKey {
    /// Build the key for a subject under a specific limit.
    pub fn new(prefix: &str, limit: &RateLimit, subject: &str) -> Self {
        Self(format!("{}:{}:{}", prefix, limit.id(), subject))
    }

    /// The key as a string slice, for store operations.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_key_format() {
        let limit = RateLimit::new(1, Duration::seconds(10)).unwrap();
        let key = StoreKey::new("ratekeeper", &limit, "10.0.0.1");
        assert_eq!(
            key.to_string(),
            format!("ratekeeper:{}:10.0.0.1", limit.id())
        );
    }

    #[test]
    fn test_same_subject_distinct_limits_do_not_collide() {
        // Identical count and period, still distinct rules.
        let a = RateLimit::new(1, Duration::seconds(10)).unwrap();
        let b = RateLimit::new(1, Duration::seconds(10)).unwrap();

        let key_a = StoreKey::new("ratekeeper", &a, "client");
        let key_b = StoreKey::new("ratekeeper", &b, "client");
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_distinct_subjects_do_not_collide() {
        let limit = RateLimit::new(1, Duration::seconds(10)).unwrap();
        let key_a = StoreKey::new("ratekeeper", &limit, "client-a");
        let key_b = StoreKey::new("ratekeeper", &limit, "client-b");
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_key_is_deterministic() {
        let limit = RateLimit::new(1, Duration::seconds(10)).unwrap();
        let key1 = StoreKey::new("ratekeeper", &limit, "client");
        let key2 = StoreKey::new("ratekeeper", &limit, "client");
        assert_eq!(key1, key2);
    }
}
