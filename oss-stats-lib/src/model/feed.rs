use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a feed entry came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedSource {
    Github,
    Blog,
    Announcement,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedCategory {
    Release,
    Announcement,
    Blog,
    Partner,
    Update,
    Other,
}

/// Significance of a release, derived from its version tag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReleaseLevel {
    Major,
    Minor,
    Patch,
    Prerelease,
}

impl ReleaseLevel {
    /// Classify a release tag such as `v5.0.1` or `@tanstack/query-core@5.0.0-beta.1`.
    ///
    /// Returns `None` when the tag does not carry a semantic version.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let version = tag.rsplit('@').next().unwrap_or(tag);
        let version = version.strip_prefix('v').unwrap_or(version);
        let version = semver::Version::parse(version).ok()?;

        Some(if !version.pre.is_empty() {
            Self::Prerelease
        } else if version.minor == 0 && version.patch == 0 {
            Self::Major
        } else if version.patch == 0 {
            Self::Minor
        } else {
            Self::Patch
        })
    }
}

/// Source-specific details attached to a feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum FeedMetadata {
    Github {
        repo: String,
        tag: String,
        url: String,
        release_level: Option<ReleaseLevel>,
        prerelease: bool,
    },
    Blog {
        slug: String,
        authors: Vec<String>,
        header_image: Option<String>,
    },
    Announcement {
        #[serde(default)]
        fields: BTreeMap<String, serde_json::Value>,
    },
}

impl FeedMetadata {
    #[must_use]
    pub const fn release_level(&self) -> Option<ReleaseLevel> {
        match self {
            Self::Github { release_level, .. } => *release_level,
            _ => None,
        }
    }
}

/// One normalized unit of publishable content in the unified timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    /// Globally unique, source-prefixed upsert key.
    pub entry_id: String,
    pub source: FeedSource,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub published_at: DateTime<Utc>,
    pub category: FeedCategory,
    pub library_ids: Vec<String>,
    #[serde(default)]
    pub partner_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_visible: bool,

    /// Set when a sync hid the entry because its source item vanished, as opposed to an editor.
    #[serde(default)]
    pub hidden_by_sync: bool,
    #[serde(default)]
    pub featured: bool,
    pub auto_synced: bool,
    pub metadata: Option<FeedMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl FeedEntry {
    /// Repository names are case-insensitive upstream, so the repository part is lowercased.
    #[must_use]
    pub fn release_id(repo: &str, tag: &str) -> String {
        format!("release:{}:{tag}", repo.to_ascii_lowercase())
    }

    #[must_use]
    pub fn blog_id(slug: &str) -> String {
        format!("blog:{slug}")
    }

    #[must_use]
    pub fn announcement_id(id: &str) -> String {
        format!("announcement:{id}")
    }

    #[must_use]
    pub fn release_level(&self) -> Option<ReleaseLevel> {
        self.metadata.as_ref().and_then(FeedMetadata::release_level)
    }

    /// Fold a freshly synced version of this entry into the stored one.
    ///
    /// Identity, creation time and editorial flags (`is_visible`, `featured`) survive; everything
    /// derived from upstream is replaced. An entry the sync hid because its source item vanished
    /// becomes visible again once the item is back.
    #[must_use]
    pub fn merged_into(self, existing: &Self) -> Self {
        let is_visible = if existing.hidden_by_sync { self.is_visible } else { existing.is_visible };
        Self {
            created_at: existing.created_at,
            is_visible,
            hidden_by_sync: false,
            featured: existing.featured,
            ..self
        }
    }
}
