use chrono::{DateTime, Utc};
use core::time::Duration;

/// Default freshness window for aggregate stats, matching the stats refresh cadence.
pub const DEFAULT_STATS_WINDOW: Duration = Duration::from_secs(6 * 60 * 60);

/// How a record ages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Never goes stale.
    Immutable,

    /// Fresh while `updated_at` falls on the current UTC day.
    SameUtcDay(DateTime<Utc>),

    /// Fresh for the policy's window after `updated_at`.
    Windowed(DateTime<Utc>),

    /// Has no staleness concept; always current as of the last write.
    Always,
}

/// Staleness rules applied by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub stats_window: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            stats_window: DEFAULT_STATS_WINDOW,
        }
    }
}

impl StalenessPolicy {
    #[must_use]
    pub const fn new(stats_window: Duration) -> Self {
        Self { stats_window }
    }

    #[must_use]
    pub fn is_fresh(&self, freshness: Freshness, now: DateTime<Utc>) -> bool {
        match freshness {
            Freshness::Immutable | Freshness::Always => true,
            Freshness::SameUtcDay(updated_at) => updated_at.date_naive() == now.date_naive(),
            Freshness::Windowed(updated_at) => {
                let age = now.signed_duration_since(updated_at);

                // A timestamp in the future means clock skew; treat the record as fresh
                if age.num_milliseconds() < 0 {
                    return true;
                }

                age.to_std().unwrap_or(Duration::MAX) < self.stats_window
            }
        }
    }
}
