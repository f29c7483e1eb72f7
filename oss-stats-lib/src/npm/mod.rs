//! npm download stats refresher.
//!
//! Download history is cached as per-package chunks aligned to calendar years. A chunk whose
//! range ends before today is immutable and is never fetched again; the chunk covering today
//! is revalidated once per UTC day. Package totals are rolled up into library and org rows.

mod chunks;
mod client;
mod refresher;

pub use chunks::{plan_chunks, rate_per_day};
pub use client::{NpmClient, RangeResponse};
pub use refresher::{NpmRefreshOutcome, NpmRefresher};
