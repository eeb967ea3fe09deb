//! Cache entry freshness

use chrono::{DateTime, Duration, Utc};

pub use spotan_common::config::DEFAULT_STALE_AFTER_DAYS;

/// Decides whether a cached entity must be refetched.
///
/// One TTL applies to every entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    ttl: Duration,
}

impl StalenessPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn from_days(days: u32) -> Self {
        Self::new(Duration::days(i64::from(days)))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// True once `now - last_refreshed >= ttl` (the boundary is stale)
    pub fn is_stale(&self, last_refreshed: DateTime<Utc>) -> bool {
        self.is_stale_at(last_refreshed, spotan_common::time::now())
    }

    pub fn is_stale_at(&self, last_refreshed: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_refreshed) >= self.ttl
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from_days(DEFAULT_STALE_AFTER_DAYS)
    }
}
