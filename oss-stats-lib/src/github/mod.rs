//! GitHub stats refresher.
//!
//! Org-level totals come from the org endpoints; per-library rows come from one fetch per
//! tracked repository. Dependents are scraped from the web surface and are best-effort.

mod client;
mod dependents;
mod refresher;

pub use client::{Contributor, GitHubClient, OrgInfo, PAGE_SIZE, Page, Release, RepoInfo, fetch_with_retry, rate_limit_wait};
pub use dependents::{fetch_dependents_count, parse_dependents_count};
pub use refresher::{GitHubRefreshOutcome, GitHubRefresher, RepoStats};
