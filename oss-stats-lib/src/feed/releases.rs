//! GitHub releases, fetched incrementally and normalized into feed entries.

use super::excerpt::generate_excerpt;
use crate::github::{GitHubClient, PAGE_SIZE, Page, Release, fetch_with_retry};
use crate::http::{ApiResult, Throttler};
use crate::model::{FeedCategory, FeedEntry, FeedMetadata, FeedSource, ReleaseLevel};
use crate::registry::RepoRef;
use chrono::{DateTime, Utc};
use core::time::Duration;
use std::sync::Arc;

const LOG_TARGET: &str = "      feed";

/// Upper bound on release pages read for one repository in one run.
const MAX_RELEASE_PAGES: u32 = 10;

/// Fetch the releases of `repo` published at or after `since`, newest first.
///
/// Listing stops at the first page that reaches past the watermark. Drafts are included; the
/// caller decides what to do with them.
pub async fn fetch_releases_since(
    client: &GitHubClient,
    throttler: &Arc<Throttler>,
    max_wait: Duration,
    repo: &RepoRef,
    since: DateTime<Utc>,
) -> ApiResult<Vec<Release>> {
    let item = repo.to_string();
    let mut releases = Vec::new();
    let mut page_num = 1;

    log::info!(target: LOG_TARGET, "Querying GitHub for releases of '{repo}' since {}", since.to_rfc3339());

    loop {
        let url = client.api_url(&format!(
            "/repos/{}/{}/releases?per_page={PAGE_SIZE}&page={page_num}",
            repo.owner, repo.name
        ));

        let page: Page<Release> = match fetch_with_retry(throttler, max_wait, &item, || client.get_page(&url)).await {
            ApiResult::Success(page) => page,
            other => return other.map(|_| Vec::new()),
        };

        let reached_watermark = page.items.iter().any(|release| release.published() < since);
        let has_next = page.has_next && !page.items.is_empty();
        releases.extend(page.items.into_iter().filter(|release| release.published() >= since));

        if reached_watermark || !has_next {
            break;
        }

        page_num += 1;
        if page_num > MAX_RELEASE_PAGES {
            log::debug!(target: LOG_TARGET, "Reached maximum release page limit ({MAX_RELEASE_PAGES}) for '{repo}'");
            break;
        }
    }

    releases.sort_by(|a, b| b.published().cmp(&a.published()));
    ApiResult::Success(releases)
}

/// Normalize a release into a feed entry owned by the given libraries.
#[must_use]
pub fn release_entry(
    repo: &RepoRef,
    display_name: &str,
    library_ids: Vec<String>,
    release: &Release,
    excerpt_length: usize,
    now: DateTime<Utc>,
) -> FeedEntry {
    let name = release
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(&release.tag_name);

    let title = if name.contains(display_name) {
        name.to_string()
    } else {
        format!("{display_name} {name}")
    };

    let content = release.body.clone().unwrap_or_default();
    let excerpt = (!content.trim().is_empty()).then(|| generate_excerpt(&content, excerpt_length));

    let release_level = ReleaseLevel::from_tag(&release.tag_name);
    let mut tags = vec!["release".to_string()];
    if let Some(level) = release_level {
        tags.push(level.to_string());
    }

    FeedEntry {
        entry_id: FeedEntry::release_id(&repo.to_string(), &release.tag_name),
        source: FeedSource::Github,
        title,
        content,
        excerpt,
        published_at: release.published(),
        category: FeedCategory::Release,
        library_ids,
        partner_ids: Vec::new(),
        tags,
        is_visible: true,
        hidden_by_sync: false,
        featured: false,
        auto_synced: true,
        metadata: Some(FeedMetadata::Github {
            repo: repo.to_string(),
            tag: release.tag_name.clone(),
            url: release.html_url.clone(),
            release_level,
            prerelease: release.prerelease,
        }),
        created_at: now,
        updated_at: now,
        last_synced_at: Some(now),
    }
}
