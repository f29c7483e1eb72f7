use crate::Result;
use crate::model::{FeedCategory, FeedEntry, FeedSource, ReleaseLevel};
use crate::store::CacheStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const LOG_TARGET: &str = "     query";

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// Which entries to include according to their editorial visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
    All,
}

/// Filters and pagination for feed reads.
///
/// Empty lists do not filter. Within one list any match suffices; across lists every filter
/// must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedQuery {
    pub sources: Vec<FeedSource>,
    pub categories: Vec<FeedCategory>,
    pub library_ids: Vec<String>,
    pub partner_ids: Vec<String>,
    pub tags: Vec<String>,
    pub release_levels: Vec<ReleaseLevel>,

    /// Case-insensitive text matched against title, excerpt and content.
    pub search: Option<String>,
    pub visibility: Visibility,
    pub featured: Option<bool>,

    /// One-based page number.
    pub page: usize,
    pub page_size: usize,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            categories: Vec::new(),
            library_ids: Vec::new(),
            partner_ids: Vec::new(),
            tags: Vec::new(),
            release_levels: Vec::new(),
            search: None,
            visibility: Visibility::Visible,
            featured: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn any_match<T: PartialEq>(wanted: &[T], present: &[T]) -> bool {
    wanted.is_empty() || present.iter().any(|p| wanted.contains(p))
}

impl FeedQuery {
    /// Whether an entry passes every filter.
    #[must_use]
    pub fn matches(&self, entry: &FeedEntry) -> bool {
        let visible = match self.visibility {
            Visibility::Visible => entry.is_visible,
            Visibility::Hidden => !entry.is_visible,
            Visibility::All => true,
        };

        visible
            && (self.sources.is_empty() || self.sources.contains(&entry.source))
            && (self.categories.is_empty() || self.categories.contains(&entry.category))
            && any_match(&self.library_ids, &entry.library_ids)
            && any_match(&self.partner_ids, &entry.partner_ids)
            && any_match(&self.tags, &entry.tags)
            && (self.release_levels.is_empty() || entry.release_level().is_some_and(|level| self.release_levels.contains(&level)))
            && self.featured.is_none_or(|featured| entry.featured == featured)
            && self.matches_search(entry)
    }

    fn matches_search(&self, entry: &FeedEntry) -> bool {
        let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return true;
        };

        let needle = search.to_lowercase();
        entry.title.to_lowercase().contains(&needle)
            || entry.excerpt.as_deref().is_some_and(|e| e.to_lowercase().contains(&needle))
            || entry.content.to_lowercase().contains(&needle)
    }

    fn page_size(&self) -> usize {
        if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size.min(MAX_PAGE_SIZE)
        }
    }
}

/// One page of feed entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub entries: Vec<FeedEntry>,

    /// Entries matching the filters across all pages.
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

fn filtered(store: &CacheStore, query: &FeedQuery) -> Result<Vec<FeedEntry>> {
    let mut entries: Vec<FeedEntry> = store.scan::<FeedEntry>()?.into_iter().filter(|entry| query.matches(entry)).collect();
    entries.sort_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.entry_id.cmp(&b.entry_id)));
    Ok(entries)
}

/// Filtered entries, newest first with ties broken by entry id, one page at a time.
pub fn list_feed_entries(store: &CacheStore, query: &FeedQuery) -> Result<FeedPage> {
    let entries = filtered(store, query)?;
    let total = entries.len();
    let page = query.page.max(1);
    let page_size = query.page_size();
    let start = (page - 1).saturating_mul(page_size);

    let entries: Vec<FeedEntry> = entries.into_iter().skip(start).take(page_size).collect();
    let has_more = start.saturating_add(entries.len()) < total;

    log::debug!(target: LOG_TARGET, "Feed page {page} holds {} of {total} matching entries", entries.len());

    Ok(FeedPage {
        entries,
        total,
        page,
        page_size,
        has_more,
    })
}

/// How many filtered entries fall into each facet value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFacetCounts {
    pub total: usize,
    pub sources: BTreeMap<FeedSource, usize>,
    pub categories: BTreeMap<FeedCategory, usize>,
    pub libraries: BTreeMap<String, usize>,
    pub tags: BTreeMap<String, usize>,
    pub release_levels: BTreeMap<ReleaseLevel, usize>,
}

/// Facet counts over every entry matching the query, ignoring pagination.
pub fn get_feed_facet_counts(store: &CacheStore, query: &FeedQuery) -> Result<FeedFacetCounts> {
    let mut counts = FeedFacetCounts::default();

    for entry in filtered(store, query)? {
        counts.total += 1;
        *counts.sources.entry(entry.source).or_default() += 1;
        *counts.categories.entry(entry.category).or_default() += 1;

        if let Some(level) = entry.release_level() {
            *counts.release_levels.entry(level).or_default() += 1;
        }

        for library in entry.library_ids {
            *counts.libraries.entry(library).or_default() += 1;
        }

        for tag in entry.tags {
            *counts.tags.entry(tag).or_default() += 1;
        }
    }

    Ok(counts)
}
