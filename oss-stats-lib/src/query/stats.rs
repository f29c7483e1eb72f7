use crate::Result;
use crate::model::{DownloadPoint, GitHubStats, NpmDownloadChunk, NpmLibraryStats, NpmOrgStats, StatsKey};
use crate::npm::plan_chunks;
use crate::registry::Registry;
use crate::store::{CacheStore, Fallback, Lookup, Record};
use chrono::{DateTime, NaiveDate, Utc};
use ohno::bail;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

const LOG_TARGET: &str = "     query";

/// Why org stats could not be served at all.
#[derive(Debug, Clone)]
pub enum QueryError {
    /// The org is not in the registry.
    UnknownOrg(String),

    /// Nothing has ever been cached for the org.
    NoData(String),

    /// The store could not be read and nothing was served.
    StoreUnavailable(Arc<ohno::AppError>),
}

impl core::fmt::Display for QueryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownOrg(org) => write!(f, "unknown org '{org}'"),
            Self::NoData(org) => write!(f, "no stats have been cached for org '{org}' yet"),
            Self::StoreUnavailable(e) => write!(f, "cache store unavailable: {e:#}"),
        }
    }
}

impl core::error::Error for QueryError {}

/// A cached row together with whether it has outlived its freshness window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView<T> {
    #[serde(flatten)]
    pub stats: T,
    pub is_stale: bool,
}

impl<T> From<Fallback<T>> for StatsView<T> {
    fn from(fallback: Fallback<T>) -> Self {
        Self {
            stats: fallback.record,
            is_stale: fallback.is_stale,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NpmStatsView {
    pub org: StatsView<NpmOrgStats>,

    /// Counter value at query time, extrapolated from the cached total and rate.
    pub interpolated_downloads: f64,
    pub libraries: Vec<StatsView<NpmLibraryStats>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubStatsView {
    pub org: StatsView<GitHubStats>,
    pub libraries: Vec<StatsView<GitHubStats>>,
}

/// Everything cached about an org. A missing half means that source was never refreshed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OssStats {
    pub org_id: String,
    pub npm: Option<NpmStatsView>,
    pub github: Option<GitHubStatsView>,
}

fn read_fallback<T: Record>(store: &CacheStore, key: &StatsKey, now: DateTime<Utc>, unavailable: &mut Option<Arc<ohno::AppError>>) -> Option<StatsView<T>> {
    match store.get_expired_as_fallback::<T>(&key.storage_key(), now) {
        Lookup::Found(fallback) => Some(fallback.into()),
        Lookup::NotFound => None,
        Lookup::Unavailable(e) => {
            let _ = unavailable.get_or_insert(e);
            None
        }
    }
}

/// Serve the cached npm and GitHub stats of an org, stale or not.
///
/// Fails only when neither source has a cached org row.
pub fn get_oss_stats(
    store: &CacheStore,
    registry: &Registry,
    org_id: &str,
    now: DateTime<Utc>,
) -> core::result::Result<OssStats, QueryError> {
    if registry.org(org_id).is_none() {
        return Err(QueryError::UnknownOrg(org_id.to_string()));
    }

    let mut unavailable = None;

    let npm = read_fallback::<NpmOrgStats>(store, &StatsKey::npm_org(org_id), now, &mut unavailable).map(|org| {
        let libraries = registry
            .libraries_for_org(org_id)
            .filter_map(|library| read_fallback(store, &StatsKey::npm_library(&library.id), now, &mut unavailable))
            .collect();

        NpmStatsView {
            interpolated_downloads: org.stats.interpolated_downloads(now),
            org,
            libraries,
        }
    });

    let github = read_fallback::<GitHubStats>(store, &StatsKey::github_org(org_id), now, &mut unavailable).map(|org| {
        let libraries = registry
            .libraries_for_org(org_id)
            .filter_map(|library| read_fallback(store, &StatsKey::github_library(&library.id), now, &mut unavailable))
            .collect();

        GitHubStatsView { org, libraries }
    });

    if npm.is_none() && github.is_none() {
        return Err(unavailable.map_or_else(|| QueryError::NoData(org_id.to_string()), QueryError::StoreUnavailable));
    }

    if npm.as_ref().is_some_and(|view| view.org.is_stale) || github.as_ref().is_some_and(|view| view.org.is_stale) {
        log::debug!(target: LOG_TARGET, "Serving stale stats for org '{org_id}'");
    }

    Ok(OssStats {
        org_id: org_id.to_string(),
        npm,
        github,
    })
}

/// Daily downloads of a library over a recent window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDownloads {
    pub library_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,

    /// One point per day with cached data, summed over the library's packages, oldest first.
    pub points: Vec<DownloadPoint>,
    pub total_downloads: u64,
}

/// Build the daily download series of a library for the `days` days ending today (UTC).
///
/// Built purely from cached chunks: only the yearly chunks that overlap the window are read,
/// planned from `history_start` the same way the npm refresher plans them. Days without cached
/// data are absent from the series.
pub fn fetch_recent_download_stats(
    store: &CacheStore,
    registry: &Registry,
    library_id: &str,
    history_start: NaiveDate,
    days: u32,
    now: DateTime<Utc>,
) -> Result<LibraryDownloads> {
    let Some(library) = registry.library(library_id) else {
        bail!("unknown library '{library_id}'");
    };

    let to = now.date_naive();
    let from = to - chrono::Duration::days(i64::from(days.max(1)) - 1);

    let keys: Vec<String> = library
        .all_packages()
        .flat_map(|package| plan_chunks(package, history_start, to))
        .filter(|key| key.to >= from)
        .map(|key| key.storage_key())
        .collect();
    let chunks = store.get_batch::<NpmDownloadChunk>(&keys).into_result()?.unwrap_or_default();

    let mut per_package_day: BTreeMap<(NaiveDate, &str), u64> = BTreeMap::new();
    for chunk in chunks.values() {
        for point in chunk.points.iter().filter(|p| p.day >= from && p.day <= to) {
            let _ = per_package_day.insert((point.day, chunk.package_name.as_str()), point.downloads);
        }
    }

    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for ((day, _), downloads) in per_package_day {
        *per_day.entry(day).or_default() += downloads;
    }

    let points: Vec<DownloadPoint> = per_day.into_iter().map(|(day, downloads)| DownloadPoint { day, downloads }).collect();
    let total_downloads = points.iter().map(|p| p.downloads).sum();

    log::debug!(target: LOG_TARGET, "Built {} day(s) of downloads for library '{library_id}' from {} chunk(s)", points.len(), chunks.len());

    Ok(LibraryDownloads {
        library_id: library_id.to_string(),
        from,
        to,
        points,
        total_downloads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChunkKey, StatsScope};
    use crate::registry::{Library, Org};
    use crate::store::{Backend, MemoryBackend, StalenessPolicy};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().to_utc()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

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
                packages: vec!["@tanstack/react-query".into()],
                legacy_packages: vec!["react-query".into()],
                track_releases: true,
            }],
        )
        .unwrap()
    }

    fn org_stats(updated_at: DateTime<Utc>) -> NpmOrgStats {
        NpmOrgStats {
            org_id: "tanstack".into(),
            total_downloads: 1_000,
            rate_per_day: 100.0,
            package_count: 2,
            packages: BTreeMap::new(),
            updated_at,
        }
    }

    #[test]
    fn nothing_cached_is_no_data() {
        let store = CacheStore::in_memory();
        let err = get_oss_stats(&store, &registry(), "tanstack", Utc::now()).unwrap_err();
        assert!(matches!(err, QueryError::NoData(_)));
    }

    #[test]
    fn unknown_org_is_rejected() {
        let store = CacheStore::in_memory();
        let err = get_oss_stats(&store, &registry(), "vercel", Utc::now()).unwrap_err();
        assert!(matches!(err, QueryError::UnknownOrg(_)));
    }

    #[test]
    fn unavailable_store_is_reported() {
        let backend = MemoryBackend::new();
        let store = CacheStore::new(Arc::clone(&backend) as Arc<dyn Backend>, StalenessPolicy::default());
        backend.set_available(false);

        let err = get_oss_stats(&store, &registry(), "tanstack", Utc::now()).unwrap_err();
        assert!(matches!(err, QueryError::StoreUnavailable(_)));
    }

    #[test]
    fn stale_stats_are_served_and_flagged() {
        let store = CacheStore::in_memory();
        let updated_at = at("2024-03-01T00:00:00Z");
        store.set(&org_stats(updated_at)).unwrap();

        let now = at("2024-03-02T00:00:00Z");
        let stats = get_oss_stats(&store, &registry(), "tanstack", now).unwrap();
        let npm = stats.npm.unwrap();
        assert!(npm.org.is_stale);
        assert!((npm.interpolated_downloads - 1_100.0).abs() < 1e-6);
        assert!(stats.github.is_none());
    }

    #[test]
    fn github_only_org_is_served() {
        let store = CacheStore::in_memory();
        let now = at("2024-03-01T01:00:00Z");
        store
            .set(&GitHubStats {
                scope: StatsScope::Org("tanstack".into()),
                star_count: 10,
                contributor_count: 2,
                dependent_count: None,
                fork_count: None,
                repository_count: Some(3),
                updated_at: at("2024-03-01T00:00:00Z"),
            })
            .unwrap();

        let stats = get_oss_stats(&store, &registry(), "tanstack", now).unwrap();
        let github = stats.github.unwrap();
        assert!(!github.org.is_stale);
        assert_eq!(github.org.stats.star_count, 10);
        assert!(stats.npm.is_none());
    }

    #[test]
    fn recent_downloads_merge_packages_from_yearly_chunks() {
        let store = CacheStore::in_memory();
        let point = |d: &str, n: u64| DownloadPoint { day: day(d), downloads: n };
        let history_start = day("2023-06-01");

        let last_year = ChunkKey::new("@tanstack/react-query", history_start, day("2023-12-31"));
        store
            .set(&NpmDownloadChunk::new(&last_year, vec![point("2023-12-31", 4)], at("2024-01-01T10:00:00Z")))
            .unwrap();

        let this_year = ChunkKey::new("@tanstack/react-query", day("2024-01-01"), day("2024-12-31"));
        store
            .set(&NpmDownloadChunk::new(
                &this_year,
                vec![point("2024-02-29", 5), point("2024-03-01", 7), point("2024-03-02", 3)],
                at("2024-03-02T10:00:00Z"),
            ))
            .unwrap();

        let legacy = ChunkKey::new("react-query", day("2024-01-01"), day("2024-12-31"));
        store
            .set(&NpmDownloadChunk::new(&legacy, vec![point("2024-03-02", 10)], at("2024-03-02T10:00:00Z")))
            .unwrap();

        // Neither a tracked package nor a planned range
        let unrelated = ChunkKey::new("@tanstack/react-table", day("2024-01-01"), day("2024-12-31"));
        store
            .set(&NpmDownloadChunk::new(&unrelated, vec![point("2024-03-02", 999)], at("2024-03-02T10:00:00Z")))
            .unwrap();
        let stray = ChunkKey::new("react-query", day("2024-01-01"), day("2024-03-01"));
        store
            .set(&NpmDownloadChunk::new(&stray, vec![point("2024-03-01", 500)], at("2024-03-01T10:00:00Z")))
            .unwrap();

        let now = at("2024-03-02T12:00:00Z");
        let recent = fetch_recent_download_stats(&store, &registry(), "query", history_start, 2, now).unwrap();
        assert_eq!(recent.from, day("2024-03-01"));
        assert_eq!(recent.points, vec![point("2024-03-01", 7), point("2024-03-02", 13)]);
        assert_eq!(recent.total_downloads, 20);

        let across_years = fetch_recent_download_stats(&store, &registry(), "query", history_start, 65, now).unwrap();
        assert_eq!(across_years.from, day("2023-12-29"));
        assert_eq!(
            across_years.points,
            vec![point("2023-12-31", 4), point("2024-02-29", 5), point("2024-03-01", 7), point("2024-03-02", 13)]
        );
        assert_eq!(across_years.total_downloads, 29);
    }

    #[test]
    fn recent_downloads_for_unknown_library_fail() {
        let store = CacheStore::in_memory();
        let _ = fetch_recent_download_stats(&store, &registry(), "nope", day("2015-01-10"), 7, Utc::now()).unwrap_err();
    }
}
