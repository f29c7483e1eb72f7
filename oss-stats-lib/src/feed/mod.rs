//! Feed synchronizer.
//!
//! GitHub releases and blog posts are normalized into [`FeedEntry`](crate::model::FeedEntry)
//! records and upserted by entry id. Hand-authored announcements go through the manual path
//! and are never touched by a sync.

mod blog;
mod excerpt;
mod manual;
mod releases;
mod synchronizer;

pub use blog::{BlogPost, ContentSource, PostListing, parse_post};
pub use excerpt::{ELLIPSIS, generate_excerpt, strip_markdown};
pub use manual::{
    FieldError, ManualEntryInput, SubmitError, create_manual_entry, delete_manual_entry, normalize_manual_entry, submit_manual_entry,
    validate_manual_entry,
};
pub use releases::{fetch_releases_since, release_entry};
pub use synchronizer::{BlogSyncResult, FeedSynchronizer, ReleaseSyncResult, SyncAllResult, Upsert};
