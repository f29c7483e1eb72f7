//! Records owned by the cache store.
//!
//! Three record families exist: npm download chunks, aggregate stats (npm and GitHub, per
//! org and per library), and feed entries. Every record carries the timestamp it was
//! computed at so the store can judge its freshness without side tables.

mod feed;
mod npm;
mod outcome;
mod stats;

pub use feed::{FeedCategory, FeedEntry, FeedMetadata, FeedSource, ReleaseLevel};
pub use npm::{BinSize, ChunkKey, DownloadPoint, NpmDownloadChunk};
pub use outcome::RefreshOutcome;
pub use stats::{
    GitHubStats, MS_PER_DAY, NpmLibraryStats, NpmOrgStats, PackageStats, StatsKey, StatsScope, StatsSource, interpolate,
};
