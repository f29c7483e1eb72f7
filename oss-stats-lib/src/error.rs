//! Classification of per-item failures reported by refresh and sync runs.
//!
//! Batch operations never fail as a whole because one item failed. Instead every failed
//! item is recorded as an [`ItemError`] in the run's result payload, classified by a
//! [`FailureKind`] so callers can tell transient upstream trouble from permanent problems.

use serde::{Deserialize, Serialize};

/// What went wrong for a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Network failure, timeout or 5xx from an upstream. Retryable.
    UpstreamUnavailable,

    /// The upstream reported the package or repository does not exist. Not retried.
    UpstreamNotFound,

    /// Input was rejected before anything was persisted.
    Validation,

    /// The cache store could not be read or written.
    StoreUnavailable,

    /// The upstream (or our own limiter) refused the request because of quota.
    RateLimited,
}

impl FailureKind {
    /// Whether running the same item again later might succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::UpstreamUnavailable | Self::StoreUnavailable | Self::RateLimited)
    }
}

/// A failure attached to one item of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    /// Identifies the failed item (package name, repository, entry id, ...).
    pub item: String,
    pub kind: FailureKind,
    pub message: String,
}

impl ItemError {
    pub fn new(item: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            kind,
            message: message.into(),
        }
    }

    /// Build an item error from an `ohno::AppError`, keeping its full context chain.
    pub fn from_app_err(item: impl Into<String>, kind: FailureKind, err: &ohno::AppError) -> Self {
        Self::new(item, kind, format!("{err:#}"))
    }
}

impl core::fmt::Display for ItemError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({}): {}", self.item, self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::UpstreamNotFound).unwrap();
        assert_eq!(json, "\"upstream_not_found\"");
        assert_eq!(FailureKind::StoreUnavailable.to_string(), "store_unavailable");
    }

    #[test]
    fn retryable_kinds() {
        assert!(FailureKind::UpstreamUnavailable.is_retryable());
        assert!(FailureKind::RateLimited.is_retryable());
        assert!(!FailureKind::UpstreamNotFound.is_retryable());
        assert!(!FailureKind::Validation.is_retryable());
    }

    #[test]
    fn item_error_display() {
        let err = ItemError::new("@tanstack/react-query", FailureKind::UpstreamUnavailable, "HTTP 503");
        assert_eq!(err.to_string(), "@tanstack/react-query (upstream_unavailable): HTTP 503");
    }

    #[test]
    fn item_error_from_app_err_keeps_message() {
        let err = ohno::app_err!("connection reset");
        let item = ItemError::from_app_err("pkg", FailureKind::UpstreamUnavailable, &err);
        assert!(item.message.contains("connection reset"));
    }
}
