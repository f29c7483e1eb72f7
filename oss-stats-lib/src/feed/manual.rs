//! Hand-authored feed entries.
//!
//! Manual entries are marked as not auto-synced, which keeps the synchronizer from ever
//! overwriting them. Only manual entries may be hard-deleted.

use super::excerpt::generate_excerpt;
use crate::Result;
use crate::model::{FeedCategory, FeedEntry, FeedMetadata, FeedSource};
use crate::ratelimit::{RateLimitDecision, RateLimitPreset, RateLimiter};
use crate::registry::Registry;
use crate::store::CacheStore;
use chrono::{DateTime, Utc};
use ohno::bail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const LOG_TARGET: &str = "      feed";

/// Partial editorial input for a manual entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ManualEntryInput {
    /// Stable id; derived from the publish date and title when absent.
    pub id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub category: Option<FeedCategory>,
    pub library_ids: Vec<String>,
    pub partner_ids: Vec<String>,
    pub tags: Vec<String>,
    pub featured: bool,
    pub is_visible: Option<bool>,

    /// Free-form details kept in the entry's metadata.
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// A rejected field of a manual entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl core::fmt::Display for FieldError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn is_blank(value: Option<&String>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Check every required field, reporting all problems at once. An empty result means valid.
///
/// With a registry, library ids must name tracked libraries.
#[must_use]
pub fn validate_manual_entry(input: &ManualEntryInput, registry: Option<&Registry>) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if is_blank(input.title.as_ref()) {
        errors.push(FieldError::new("title", "is required"));
    }

    if is_blank(input.content.as_ref()) {
        errors.push(FieldError::new("content", "is required"));
    }

    if input.published_at.is_none() {
        errors.push(FieldError::new("publishedAt", "is required"));
    }

    if input.category.is_none() {
        errors.push(FieldError::new("category", "is required"));
    }

    if input.library_ids.iter().all(|id| id.trim().is_empty()) {
        errors.push(FieldError::new("libraryIds", "at least one library is required"));
    } else if let Some(registry) = registry {
        for id in &input.library_ids {
            if !registry.contains_library(id) {
                errors.push(FieldError::new("libraryIds", format!("unknown library '{id}'")));
            }
        }
    }

    if let Some(id) = &input.id
        && (id.trim().is_empty() || id.contains(char::is_whitespace))
    {
        errors.push(FieldError::new("id", "must be non-empty and contain no whitespace"));
    }

    errors
}

/// Turn validated input into a feed entry, generating the excerpt when none was supplied.
pub fn normalize_manual_entry(input: ManualEntryInput, registry: Option<&Registry>, excerpt_length: usize, now: DateTime<Utc>) -> Result<FeedEntry> {
    let errors = validate_manual_entry(&input, registry);
    if !errors.is_empty() {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!("invalid feed entry: {}", details.join("; "));
    }

    let (Some(title), Some(content), Some(published_at), Some(category)) = (input.title, input.content, input.published_at, input.category) else {
        bail!("invalid feed entry");
    };

    let title = title.trim().to_string();
    let id = input.id.unwrap_or_else(|| format!("{}-{}", published_at.format("%Y%m%d"), slugify(&title)));
    let excerpt = input
        .excerpt
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| generate_excerpt(&content, excerpt_length));

    Ok(FeedEntry {
        entry_id: FeedEntry::announcement_id(&id),
        source: FeedSource::Announcement,
        title,
        content,
        excerpt: Some(excerpt),
        published_at,
        category,
        library_ids: input.library_ids.into_iter().filter(|id| !id.trim().is_empty()).collect(),
        partner_ids: input.partner_ids,
        tags: input.tags,
        is_visible: input.is_visible.unwrap_or(true),
        hidden_by_sync: false,
        featured: input.featured,
        auto_synced: false,
        metadata: Some(FeedMetadata::Announcement { fields: input.fields }),
        created_at: now,
        updated_at: now,
        last_synced_at: None,
    })
}

/// Validate and persist a manual entry.
///
/// Re-submitting an existing manual entry replaces it while keeping its creation time. An id
/// already used by a synced entry is rejected.
pub fn create_manual_entry(
    store: &CacheStore,
    registry: &Registry,
    input: ManualEntryInput,
    excerpt_length: usize,
    now: DateTime<Utc>,
) -> Result<FeedEntry> {
    let mut entry = normalize_manual_entry(input, Some(registry), excerpt_length, now)?;

    if let Some(existing) = store.get::<FeedEntry>(&entry.entry_id).into_result()? {
        if existing.auto_synced {
            bail!("entry '{}' is synced automatically and cannot be replaced by a manual entry", entry.entry_id);
        }
        entry.created_at = existing.created_at;
    }

    store.set(&entry)?;
    log::info!(target: LOG_TARGET, "Stored manual feed entry '{}'", entry.entry_id);
    Ok(entry)
}

/// Why a submitted manual entry was not stored.
#[derive(Debug)]
pub enum SubmitError {
    /// The submitter is over its quota. Nothing was validated or written.
    RateLimited(RateLimitDecision),

    /// The entry was invalid or could not be stored.
    Rejected(ohno::AppError),
}

impl core::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RateLimited(decision) => write!(f, "too many submissions, retry after {}", decision.reset_at),
            Self::Rejected(e) => write!(f, "{e:#}"),
        }
    }
}

impl core::error::Error for SubmitError {}

/// [`create_manual_entry`] behind the [`RateLimitPreset::Sensitive`] quota of `submitter`.
///
/// The quota is checked before the input is even validated.
pub fn submit_manual_entry(
    limiter: &RateLimiter,
    submitter: &str,
    store: &CacheStore,
    registry: &Registry,
    input: ManualEntryInput,
    excerpt_length: usize,
    now: DateTime<Utc>,
) -> Result<FeedEntry, SubmitError> {
    let decision = limiter.check_preset(submitter, RateLimitPreset::Sensitive, now);
    if !decision.allowed {
        log::warn!(target: LOG_TARGET, "Refusing manual entry from '{submitter}' until {}", decision.reset_at);
        return Err(SubmitError::RateLimited(decision));
    }

    create_manual_entry(store, registry, input, excerpt_length, now).map_err(SubmitError::Rejected)
}

/// Hard-delete a manual entry. Returns whether it existed.
pub fn delete_manual_entry(store: &CacheStore, entry_id: &str) -> Result<bool> {
    match store.get::<FeedEntry>(entry_id).into_result()? {
        None => Ok(false),
        Some(existing) if existing.auto_synced => {
            bail!("entry '{entry_id}' is synced automatically; hide it instead of deleting it")
        }
        Some(_) => {
            let deleted = store.delete::<FeedEntry>(entry_id)?;
            log::info!(target: LOG_TARGET, "Deleted manual feed entry '{entry_id}'");
            Ok(deleted)
        }
    }
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_end_matches('-');
    if slug.is_empty() { "entry".to_string() } else { slug.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Library, Org};

    fn registry() -> Registry {
        Registry::new(
            vec![Org {
                id: "tanstack".into(),
                github: "TanStack".into(),
            }],
            vec![Library {
                id: "query".into(),
                name: None,
                org: "tanstack".into(),
                repo: "TanStack/query".into(),
                packages: vec![],
                legacy_packages: vec![],
                track_releases: true,
            }],
        )
        .unwrap()
    }

    fn input() -> ManualEntryInput {
        ManualEntryInput {
            title: Some("Query v5 Workshop".into()),
            content: Some("Join us for a **live** workshop.".into()),
            published_at: Some(DateTime::parse_from_rfc3339("2024-05-01T15:00:00Z").unwrap().to_utc()),
            category: Some(FeedCategory::Announcement),
            library_ids: vec!["query".into()],
            ..ManualEntryInput::default()
        }
    }

    #[test]
    fn test_submissions_over_quota_are_refused_before_validation() {
        let store = CacheStore::in_memory();
        let limiter = RateLimiter::new();
        let now = DateTime::parse_from_rfc3339("2024-05-01T16:00:00Z").unwrap().to_utc();
        let limit = RateLimitPreset::Sensitive.limit_per_minute();

        for i in 0..limit {
            let entry = ManualEntryInput {
                id: Some(format!("entry-{i}")),
                ..input()
            };
            let _ = submit_manual_entry(&limiter, "editor", &store, &registry(), entry, 200, now).unwrap();
        }

        let over = ManualEntryInput {
            id: Some("one-too-many".into()),
            ..input()
        };
        let err = submit_manual_entry(&limiter, "editor", &store, &registry(), over, 200, now).unwrap_err();
        let decision = match err {
            SubmitError::RateLimited(decision) => decision,
            other => panic!("expected a rate limit refusal, got {other}"),
        };
        assert_eq!(decision.remaining, 0);
        assert!(decision.reset_at > now);
        assert!(store.get::<FeedEntry>("announcement:one-too-many").found().is_none());

        // Invalid input from another submitter is still validated
        let err = submit_manual_entry(&limiter, "someone-else", &store, &registry(), ManualEntryInput::default(), 200, now).unwrap_err();
        assert!(matches!(err, SubmitError::Rejected(_)));
    }

    #[test]
    fn test_all_missing_fields_reported_at_once() {
        let errors = validate_manual_entry(&ManualEntryInput::default(), None);
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["title", "content", "publishedAt", "category", "libraryIds"]);
    }

    #[test]
    fn test_unknown_library_rejected_with_registry() {
        let mut input = input();
        input.library_ids.push("nope".into());
        assert!(validate_manual_entry(&input, None).is_empty());

        let errors = validate_manual_entry(&input, Some(&registry()));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("nope"));
    }

    #[test]
    fn test_normalized_entry_is_manual_with_excerpt() {
        let entry = normalize_manual_entry(input(), None, 200, Utc::now()).unwrap();
        assert_eq!(entry.entry_id, "announcement:20240501-query-v5-workshop");
        assert!(!entry.auto_synced);
        assert!(entry.is_visible);
        assert_eq!(entry.excerpt.as_deref(), Some("Join us for a live workshop."));
    }

    #[test]
    fn test_create_then_delete() {
        let store = CacheStore::in_memory();
        let registry = registry();
        let entry = create_manual_entry(&store, &registry, input(), 200, Utc::now()).unwrap();

        assert!(store.get::<FeedEntry>(&entry.entry_id).found().is_some());
        assert!(delete_manual_entry(&store, &entry.entry_id).unwrap());
        assert!(!delete_manual_entry(&store, &entry.entry_id).unwrap());
    }

    #[test]
    fn test_invalid_entry_is_not_persisted() {
        let store = CacheStore::in_memory();
        let mut input = input();
        input.title = Some("   ".into());

        let err = create_manual_entry(&store, &registry(), input, 200, Utc::now()).unwrap_err();
        assert!(format!("{err:#}").contains("title"));
        assert!(store.scan::<FeedEntry>().unwrap().is_empty());
    }

    #[test]
    fn test_synced_entries_cannot_be_deleted() {
        let store = CacheStore::in_memory();
        let mut entry = normalize_manual_entry(input(), None, 200, Utc::now()).unwrap();
        entry.auto_synced = true;
        store.set(&entry).unwrap();

        let _ = delete_manual_entry(&store, &entry.entry_id).unwrap_err();
        assert!(store.get::<FeedEntry>(&entry.entry_id).found().is_some());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("***"), "entry");
    }
}
