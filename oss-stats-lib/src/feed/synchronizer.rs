use super::blog::{BlogPost, ContentSource};
use super::excerpt::generate_excerpt;
use super::releases::{fetch_releases_since, release_entry};
use crate::Result;
use crate::config::{FeedConfig, GitHubConfig};
use crate::error::ItemError;
use crate::github::GitHubClient;
use crate::http::Throttler;
use crate::model::{FeedCategory, FeedEntry, FeedMetadata, FeedSource};
use crate::registry::Registry;
use crate::store::CacheStore;
use chrono::{DateTime, Utc};
use core::time::Duration;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

const LOG_TARGET: &str = "      feed";

/// What an upsert did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,

    /// A manual entry owns the id; the synced version was dropped.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSyncResult {
    /// Entries created or updated
    pub synced_count: usize,
    pub created: usize,
    pub updated: usize,

    /// Drafts and releases whose id is owned by a manual entry
    pub skipped_count: usize,
    pub error_count: usize,
    pub errors: Vec<ItemError>,
    pub duration_ms: u64,
}

impl ReleaseSyncResult {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.error_count == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogSyncResult {
    pub synced_count: usize,
    pub created: usize,
    pub updated: usize,

    /// Previously synced posts that disappeared from the source and were hidden
    pub hidden: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub errors: Vec<ItemError>,
    pub duration_ms: u64,
}

impl BlogSyncResult {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.error_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAllResult {
    pub releases: ReleaseSyncResult,
    pub blog: BlogSyncResult,
    pub error_count: usize,
    pub success: bool,
}

/// Pulls releases and blog posts into the feed table.
///
/// Every sync is an idempotent upsert keyed by entry id, so runs may overlap or repeat.
#[derive(Debug, Clone)]
pub struct FeedSynchronizer {
    store: CacheStore,
    registry: Arc<Registry>,
    github: GitHubClient,
    blog: ContentSource,
    config: FeedConfig,
    github_config: GitHubConfig,
}

impl FeedSynchronizer {
    #[must_use]
    pub const fn new(
        store: CacheStore,
        registry: Arc<Registry>,
        github: GitHubClient,
        blog: ContentSource,
        config: FeedConfig,
        github_config: GitHubConfig,
    ) -> Self {
        Self {
            store,
            registry,
            github,
            blog,
            config,
            github_config,
        }
    }

    /// Insert a new entry or fold it into the stored one, never touching manual entries.
    pub fn upsert(&self, entry: FeedEntry) -> Result<Upsert> {
        match self.store.get::<FeedEntry>(&entry.entry_id).into_result()? {
            None => {
                self.store.set(&entry)?;
                Ok(Upsert::Created)
            }
            Some(existing) if !existing.auto_synced => {
                log::debug!(target: LOG_TARGET, "Leaving manual entry '{}' alone", entry.entry_id);
                Ok(Upsert::Skipped)
            }
            Some(existing) => {
                self.store.set(&entry.merged_into(&existing))?;
                Ok(Upsert::Updated)
            }
        }
    }

    /// Sync releases of every tracked repository published within the lookback window.
    ///
    /// Without `days_back`, a repository with synced releases looks back over the regular window
    /// and one without any looks back over the cold-start window.
    pub async fn sync_github_releases(&self, days_back: Option<u32>, now: DateTime<Utc>) -> Result<ReleaseSyncResult> {
        let started = Instant::now();
        let repos = self.registry.release_repos();

        let synced_repos: HashSet<String> = self
            .store
            .scan::<FeedEntry>()?
            .into_iter()
            .filter_map(|entry| match entry.metadata {
                Some(FeedMetadata::Github { repo, .. }) if entry.auto_synced => Some(repo.to_ascii_lowercase()),
                _ => None,
            })
            .collect();

        let throttler = Throttler::new(self.github_config.concurrency, Duration::ZERO);
        let max_wait = self.github_config.max_rate_limit_wait;

        let fetches = repos.iter().map(|(repo, _)| {
            let lookback = match days_back {
                Some(days) => chrono::Duration::days(i64::from(days)),
                None if synced_repos.contains(&repo.to_string().to_ascii_lowercase()) => to_chrono(self.config.release_lookback),
                None => to_chrono(self.config.cold_start_lookback),
            };
            let since = now.checked_sub_signed(lookback).unwrap_or(DateTime::<Utc>::MIN_UTC);
            fetch_releases_since(&self.github, &throttler, max_wait, repo, since)
        });
        let fetched = join_all(fetches).await;

        let mut result = ReleaseSyncResult::default();
        for ((repo, library), releases) in repos.iter().zip(fetched) {
            let releases = match releases.into_item_result(&repo.to_string()) {
                Ok(releases) => releases,
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "Could not sync releases of {e}");
                    result.errors.push(e);
                    continue;
                }
            };

            for release in releases {
                if release.draft {
                    result.skipped_count += 1;
                    continue;
                }

                let entry = release_entry(
                    repo,
                    library.display_name(),
                    vec![library.id.clone()],
                    &release,
                    self.config.excerpt_length,
                    now,
                );
                match self.upsert(entry)? {
                    Upsert::Created => result.created += 1,
                    Upsert::Updated => result.updated += 1,
                    Upsert::Skipped => result.skipped_count += 1,
                }
            }
        }

        result.synced_count = result.created + result.updated;
        result.error_count = result.errors.len();
        result.duration_ms = elapsed_ms(started);

        log::info!(
            target: LOG_TARGET,
            "Release sync: {} created, {} updated, {} skipped, {} error(s)",
            result.created,
            result.updated,
            result.skipped_count,
            result.error_count
        );

        Ok(result)
    }

    /// Sync every blog post of the content source, hiding synced posts that disappeared.
    ///
    /// A source that cannot be listed at all fails the run without hiding anything.
    pub async fn sync_blog_posts(&self, now: DateTime<Utc>) -> Result<BlogSyncResult> {
        let started = Instant::now();
        let mut result = BlogSyncResult::default();

        if !self.blog.is_configured() {
            log::debug!(target: LOG_TARGET, "No blog source configured, skipping blog sync");
            return Ok(result);
        }

        let listing = self.blog.list_posts().await?;

        let mut seen: HashSet<String> = listing.errors.iter().map(|e| FeedEntry::blog_id(&e.item)).collect();
        result.errors = listing.errors;

        for post in listing.posts {
            let entry = self.blog_entry(post, now);
            let _ = seen.insert(entry.entry_id.clone());

            match self.upsert(entry)? {
                Upsert::Created => result.created += 1,
                Upsert::Updated => result.updated += 1,
                Upsert::Skipped => result.skipped_count += 1,
            }
        }

        for mut entry in self.store.scan::<FeedEntry>()? {
            if entry.source == FeedSource::Blog && entry.auto_synced && entry.is_visible && !seen.contains(&entry.entry_id) {
                log::info!(target: LOG_TARGET, "Hiding blog entry '{}', its post is gone", entry.entry_id);
                entry.is_visible = false;
                entry.hidden_by_sync = true;
                entry.updated_at = now;
                self.store.set(&entry)?;
                result.hidden += 1;
            }
        }

        result.synced_count = result.created + result.updated;
        result.error_count = result.errors.len();
        result.duration_ms = elapsed_ms(started);

        log::info!(
            target: LOG_TARGET,
            "Blog sync: {} created, {} updated, {} hidden, {} error(s)",
            result.created,
            result.updated,
            result.hidden,
            result.error_count
        );

        Ok(result)
    }

    /// Run the release and blog syncs one after the other.
    pub async fn sync_all(&self, now: DateTime<Utc>) -> Result<SyncAllResult> {
        let releases = self.sync_github_releases(None, now).await?;
        let blog = self.sync_blog_posts(now).await?;
        let error_count = releases.error_count + blog.error_count;

        Ok(SyncAllResult {
            releases,
            blog,
            error_count,
            success: error_count == 0,
        })
    }

    fn blog_entry(&self, post: BlogPost, now: DateTime<Utc>) -> FeedEntry {
        let excerpt = post
            .excerpt
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| generate_excerpt(&post.content, self.config.excerpt_length));
        let link = format!("{}/blog/{}", self.config.site_url.trim_end_matches('/'), post.slug);

        FeedEntry {
            entry_id: FeedEntry::blog_id(&post.slug),
            source: FeedSource::Blog,
            title: post.title,
            content: format!("{excerpt}\n\n[Read more \u{2192}]({link})"),
            excerpt: Some(excerpt),
            published_at: post.published,
            category: FeedCategory::Blog,
            library_ids: Vec::new(),
            partner_ids: Vec::new(),
            tags: Vec::new(),
            is_visible: true,
            hidden_by_sync: false,
            featured: false,
            auto_synced: true,
            metadata: Some(FeedMetadata::Blog {
                slug: post.slug,
                authors: post.authors,
                header_image: post.header_image,
            }),
            created_at: now,
            updated_at: now,
            last_synced_at: Some(now),
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
