use crate::error::ItemError;
use serde::Serialize;

/// Result of one stats refresh run.
///
/// `org_stats` is `None` when the run did not produce an org row worth caching (for
/// example during a total upstream outage); the previously cached row stays in place.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome<O, L, P = ()> {
    pub org_stats: Option<O>,
    pub library_results: Vec<L>,
    pub library_errors: Vec<ItemError>,

    /// Per-item details behind the library rows (packages for npm, repositories for GitHub).
    pub item_results: Vec<P>,
    pub duration_ms: u64,
}

impl<O, L, P> RefreshOutcome<O, L, P> {
    /// A run is successful only when no item failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.library_errors.is_empty()
    }
}
