//! Fixed-window rate limiter for caller-facing endpoints.
//!
//! Each `(scope, identifier)` pair gets a counter for the current one-minute window. The
//! window starts with the first call and resets a minute later; calls beyond the limit are
//! refused until then.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

const LOG_TARGET: &str = " ratelimit";

/// Length of a rate limit window.
pub const WINDOW: chrono::Duration = chrono::Duration::minutes(1);

/// Named limits per endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RateLimitPreset {
    /// Loading a remote template or add-on
    TemplateLoad,

    /// Operations that are expensive or abusable
    Sensitive,
}

impl RateLimitPreset {
    #[must_use]
    pub const fn limit_per_minute(self) -> u32 {
        match self {
            Self::TemplateLoad => 30,
            Self::Sensitive => 10,
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, rounded up, suitable for a `Retry-After` header.
    #[must_use]
    pub fn retry_after(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0);
        u64::try_from(millis).unwrap_or(0).div_ceil(1000)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

impl Window {
    fn reset_at(&self) -> DateTime<Utc> {
        self.started_at + WINDOW
    }
}

/// Shared counters. Cloning is not supported; share through an `Arc`.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, String), Window>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a call from `identifier` against `scope` and decide whether it may proceed.
    ///
    /// A refused call does not consume quota. A limit of zero refuses everything.
    pub fn check(&self, identifier: &str, scope: &str, limit_per_minute: u32, now: DateTime<Utc>) -> RateLimitDecision {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.retain(|_, window| window.reset_at() > now);

        let window = windows.entry((scope.to_string(), identifier.to_string())).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if window.count >= limit_per_minute {
            log::debug!(target: LOG_TARGET, "Refusing '{identifier}' for scope '{scope}' until {}", window.reset_at());
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: window.reset_at(),
            };
        }

        window.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: limit_per_minute - window.count,
            reset_at: window.reset_at(),
        }
    }

    /// [`check`](Self::check) with the limit and scope of a preset.
    pub fn check_preset(&self, identifier: &str, preset: RateLimitPreset, now: DateTime<Utc>) -> RateLimitDecision {
        self.check(identifier, preset.into(), preset.limit_per_minute(), now)
    }

    /// Number of live windows, after dropping expired ones.
    pub fn tracked(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.retain(|_, window| window.reset_at() > now);
        windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().to_utc()
    }

    #[test]
    fn boundary_of_five_per_minute() {
        let limiter = RateLimiter::new();
        let start = at("2024-03-01T12:00:00Z");

        for i in 0..5 {
            let decision = limiter.check("1.2.3.4", "template", 5, start + chrono::Duration::seconds(i));
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 4 - u32::try_from(i).unwrap());
        }

        let now = start + chrono::Duration::seconds(10);
        let refused = limiter.check("1.2.3.4", "template", 5, now);
        assert!(!refused.allowed);
        assert_eq!(refused.remaining, 0);
        assert!(refused.reset_at > now);
        assert_eq!(refused.retry_after(now), 50);

        let later = refused.reset_at;
        assert!(limiter.check("1.2.3.4", "template", 5, later).allowed);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        let now = Utc::now();

        assert!(limiter.check("a", "scope", 1, now).allowed);
        assert!(!limiter.check("a", "scope", 1, now).allowed);
        assert!(limiter.check("b", "scope", 1, now).allowed);
        assert!(limiter.check("a", "other", 1, now).allowed);
    }

    #[test]
    fn expired_windows_are_pruned() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        let _ = limiter.check("a", "scope", 5, now);
        let _ = limiter.check("b", "scope", 5, now);

        assert_eq!(limiter.tracked(now), 2);
        assert_eq!(limiter.tracked(now + WINDOW), 0);
    }

    #[test]
    fn presets() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        for _ in 0..10 {
            assert!(limiter.check_preset("ip", RateLimitPreset::Sensitive, now).allowed);
        }
        assert!(!limiter.check_preset("ip", RateLimitPreset::Sensitive, now).allowed);
        assert!(limiter.check_preset("ip", RateLimitPreset::TemplateLoad, now).allowed);
        assert_eq!(RateLimitPreset::TemplateLoad.limit_per_minute(), 30);
    }

    #[test]
    fn zero_limit_refuses() {
        let limiter = RateLimiter::new();
        assert!(!limiter.check("a", "scope", 0, Utc::now()).allowed);
    }
}
