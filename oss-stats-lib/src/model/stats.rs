use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Milliseconds in a day, the unit consumers use when interpolating counters.
pub const MS_PER_DAY: f64 = 86_400_000.0;

/// Upstream a stats row was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatsSource {
    Npm,
    #[serde(rename = "github")]
    #[strum(serialize = "github")]
    GitHub,
}

/// Whether a stats row covers a whole org or a single library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StatsScope {
    Org(String),
    Library(String),
}

impl StatsScope {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Org(id) | Self::Library(id) => id,
        }
    }
}

impl core::fmt::Display for StatsScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Org(id) => write!(f, "org:{id}"),
            Self::Library(id) => write!(f, "library:{id}"),
        }
    }
}

/// Key of an aggregate stats row: org or library id plus the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatsKey {
    pub source: StatsSource,
    pub scope: StatsScope,
}

impl StatsKey {
    #[must_use]
    pub const fn new(source: StatsSource, scope: StatsScope) -> Self {
        Self { source, scope }
    }

    #[must_use]
    pub fn npm_org(org_id: &str) -> Self {
        Self::new(StatsSource::Npm, StatsScope::Org(org_id.to_string()))
    }

    #[must_use]
    pub fn npm_library(library_id: &str) -> Self {
        Self::new(StatsSource::Npm, StatsScope::Library(library_id.to_string()))
    }

    #[must_use]
    pub fn github_org(org_id: &str) -> Self {
        Self::new(StatsSource::GitHub, StatsScope::Org(org_id.to_string()))
    }

    #[must_use]
    pub fn github_library(library_id: &str) -> Self {
        Self::new(StatsSource::GitHub, StatsScope::Library(library_id.to_string()))
    }

    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.source, self.scope)
    }
}

/// Download statistics for one package, as computed by a refresh run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageStats {
    pub name: String,
    pub library_id: String,
    pub total_downloads: u64,
    pub rate_per_day: f64,
    #[serde(default)]
    pub chunks_cached: u32,
    #[serde(default)]
    pub chunks_fetched: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpmLibraryStats {
    pub library_id: String,
    pub total_downloads: u64,
    pub rate_per_day: f64,
    pub package_count: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpmOrgStats {
    pub org_id: String,
    pub total_downloads: u64,
    pub rate_per_day: f64,
    pub package_count: u32,
    pub packages: BTreeMap<String, PackageStats>,
    pub updated_at: DateTime<Utc>,
}

impl NpmOrgStats {
    /// The live-counter value at `now`, extrapolated from the last refresh.
    #[must_use]
    pub fn interpolated_downloads(&self, now: DateTime<Utc>) -> f64 {
        interpolate(self.total_downloads, self.rate_per_day, self.updated_at, now)
    }
}

impl NpmLibraryStats {
    #[must_use]
    pub fn interpolated_downloads(&self, now: DateTime<Utc>) -> f64 {
        interpolate(self.total_downloads, self.rate_per_day, self.updated_at, now)
    }
}

/// GitHub metrics for an org or a single repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubStats {
    pub scope: StatsScope,
    pub star_count: u64,
    pub contributor_count: u64,
    pub dependent_count: Option<u64>,
    pub fork_count: Option<u64>,
    /// Only present on org-level rows.
    pub repository_count: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

/// `base + rate_per_day / MS_PER_DAY * (now - updated_at)`.
///
/// The result is only meaningful for animating a counter; it is not an accounting figure.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "download counts stay well within f64 precision")]
pub fn interpolate(base: u64, rate_per_day: f64, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let elapsed_ms = (now - updated_at).num_milliseconds() as f64;
    base as f64 + rate_per_day / MS_PER_DAY * elapsed_ms
}
