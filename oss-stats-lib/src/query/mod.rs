//! Read-only views over the cache store for the rendering layer.
//!
//! Nothing here talks to an upstream. Stats are served from whatever was last cached, flagged
//! stale when past their freshness window; the feed is filtered, ordered and paginated in
//! memory from the feed table.

mod feed;
mod stats;

pub use feed::{FeedFacetCounts, FeedPage, FeedQuery, Visibility, get_feed_facet_counts, list_feed_entries};
pub use stats::{
    GitHubStatsView, LibraryDownloads, NpmStatsView, OssStats, QueryError, StatsView, fetch_recent_download_stats,
    get_oss_stats,
};
