//! Cheap liveness classification of cached connections. No round trips.

use crate::connection::cache::CachePolicy;
use crate::connection::handle::TenantConnection;
use crate::connection::record::{ConnectionState, TenantConnectionRecord};
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
}

/// Where a record sits relative to the cache's two staleness thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgeBucket {
    /// Refreshed within the fast-path window; reuse without a probe.
    Fresh,
    /// Younger than the max age; reuse after a cheap probe.
    Recent,
    /// At or past the max age; always recycled.
    Expired,
}

#[derive(Clone, Debug)]
pub struct HealthChecker {
    policy: CachePolicy,
}

impl HealthChecker {
    pub fn new(policy: CachePolicy) -> Self {
        HealthChecker { policy }
    }

    pub fn age_bucket<H>(&self, record: &TenantConnectionRecord<H>, now: Instant) -> AgeBucket {
        if record.age(now) >= self.policy.max_age {
            AgeBucket::Expired
        } else if record.idle(now) < self.policy.fast_path {
            AgeBucket::Fresh
        } else {
            AgeBucket::Recent
        }
    }

    /// `None` for expired records: those are recycled regardless of liveness.
    pub fn classify<H: TenantConnection>(
        &self,
        record: &TenantConnectionRecord<H>,
        now: Instant,
    ) -> Option<Liveness> {
        if self.age_bucket(record, now) == AgeBucket::Expired {
            return None;
        }
        if record.state() == ConnectionState::Ready && record.connection.is_live() {
            Some(Liveness::Alive)
        } else {
            Some(Liveness::Dead)
        }
    }
}
