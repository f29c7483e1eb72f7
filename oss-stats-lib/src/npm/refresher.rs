use super::chunks::{plan_chunks, rate_per_day};
use super::client::NpmClient;
use crate::Result;
use crate::config::NpmConfig;
use crate::error::{FailureKind, ItemError};
use crate::http::{ApiResult, Throttler};
use crate::model::{ChunkKey, DownloadPoint, NpmDownloadChunk, NpmLibraryStats, NpmOrgStats, PackageStats, RefreshOutcome};
use crate::registry::{PackageRef, Registry};
use crate::store::{CacheStore, Lookup};
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use ohno::{EnrichableExt, app_err, bail};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

const LOG_TARGET: &str = "       npm";

pub type NpmRefreshOutcome = RefreshOutcome<NpmOrgStats, NpmLibraryStats, PackageStats>;

/// Outcome of refreshing one package. The outer error is a store failure, which aborts the run.
type PackageResult = Result<Result<PackageStats, ItemError>>;

/// Refreshes npm download stats for the orgs of a registry.
///
/// Each call to [`NpmRefresher::refresh_org_stats`] is a self-contained run: everything is
/// re-derived from upstream and the cached chunks, and nothing is kept between runs.
#[derive(Debug, Clone)]
pub struct NpmRefresher {
    client: NpmClient,
    store: CacheStore,
    registry: Arc<Registry>,
    config: NpmConfig,
}

impl NpmRefresher {
    #[must_use]
    pub const fn new(client: NpmClient, store: CacheStore, registry: Arc<Registry>, config: NpmConfig) -> Self {
        Self {
            client,
            store,
            registry,
            config,
        }
    }

    /// Refresh every package of an org, then replace its library and org rows.
    ///
    /// Per-package failures are reported in the outcome. A store failure, an unknown org or an
    /// org without packages fails the whole run and leaves the cached rows untouched.
    pub async fn refresh_org_stats(&self, org_id: &str, now: DateTime<Utc>) -> Result<NpmRefreshOutcome> {
        let started = Instant::now();

        if self.registry.org(org_id).is_none() {
            bail!("unknown org '{org_id}'");
        }

        let packages = self.registry.packages_for_org(org_id);
        if packages.is_empty() {
            bail!("org '{org_id}' has no registered npm packages");
        }

        log::info!(target: LOG_TARGET, "Refreshing download stats for {} package(s) of org '{org_id}'", packages.len());

        let throttler = Throttler::new(self.config.concurrency, self.config.request_delay);
        let today = now.date_naive();

        let results: Vec<PackageResult> = join_all(
            packages
                .iter()
                .map(|package| self.refresh_package(package, &throttler, today, now)),
        )
        .await;

        let mut successes = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result? {
                Ok(stats) => successes.push(stats),
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "Could not refresh downloads of {e}");
                    errors.push(e);
                }
            }
        }

        let by_name: HashMap<&str, &PackageStats> = successes.iter().map(|s| (s.name.as_str(), s)).collect();

        let mut library_results = Vec::new();
        for library in self.registry.libraries_for_org(org_id) {
            let stats: Vec<&PackageStats> = library.all_packages().filter_map(|name| by_name.get(name).copied()).collect();
            if stats.is_empty() {
                log::debug!(target: LOG_TARGET, "No successful packages for library '{}', keeping its cached row", library.id);
                continue;
            }

            library_results.push(NpmLibraryStats {
                library_id: library.id.clone(),
                total_downloads: stats.iter().map(|s| s.total_downloads).sum(),
                rate_per_day: stats.iter().map(|s| s.rate_per_day).sum(),
                package_count: count_u32(stats.len()),
                updated_at: now,
            });
        }

        let org_stats = if successes.is_empty() {
            log::error!(target: LOG_TARGET, "Every package of org '{org_id}' failed, keeping the cached org row");
            None
        } else {
            Some(NpmOrgStats {
                org_id: org_id.to_string(),
                total_downloads: successes.iter().map(|s| s.total_downloads).sum(),
                rate_per_day: successes.iter().map(|s| s.rate_per_day).sum(),
                package_count: count_u32(successes.len()),
                packages: successes.iter().map(|s| (s.name.clone(), s.clone())).collect::<BTreeMap<_, _>>(),
                updated_at: now,
            })
        };

        for library in &library_results {
            self.store.set(library)?;
        }

        if let Some(org) = &org_stats {
            self.store.set(org)?;
            log::info!(
                target: LOG_TARGET,
                "Org '{org_id}' has {} downloads across {} package(s), {:.1}/day",
                org.total_downloads,
                org.package_count,
                org.rate_per_day
            );
        }

        Ok(RefreshOutcome {
            org_stats,
            library_results,
            library_errors: errors,
            item_results: successes,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn refresh_package(&self, package: &PackageRef, throttler: &Arc<Throttler>, today: NaiveDate, now: DateTime<Utc>) -> PackageResult {
        let keys = plan_chunks(&package.name, self.config.history_start, today);
        let storage_keys: Vec<String> = keys.iter().map(ChunkKey::storage_key).collect();

        let mut cached = match self.store.get_batch::<NpmDownloadChunk>(&storage_keys) {
            Lookup::Found(map) => map,
            Lookup::NotFound => HashMap::new(),
            Lookup::Unavailable(e) => return Err(app_err!("reading cached chunks of '{}': {e:#}", package.name)),
        };

        let mut points: Vec<DownloadPoint> = Vec::new();
        let mut total_downloads = 0;
        let mut chunks_cached = 0;
        let mut chunks_fetched = 0;

        for (key, storage_key) in keys.iter().zip(&storage_keys) {
            let chunk = match cached.remove(storage_key) {
                Some(chunk) if self.store.is_fresh(&chunk, now) => {
                    chunks_cached += 1;
                    chunk
                }
                _ => {
                    let fetched = {
                        let _permit = throttler.acquire().await;
                        self.client.fetch_range(key, now).await
                    };

                    let new_points = match fetched {
                        ApiResult::Success(points) => points,
                        other => return Ok(Err(item_error(package, key, other))),
                    };

                    let chunk = NpmDownloadChunk::new(key, new_points, now);
                    self.store
                        .set(&chunk)
                        .map_err(|e| e.enrich_with(|| format!("caching downloads of '{}'", package.name)))?;
                    chunks_fetched += 1;
                    chunk
                }
            };

            total_downloads += chunk.total_downloads;
            points.extend(chunk.points);
        }

        let stats = PackageStats {
            name: package.name.clone(),
            library_id: package.library_id.clone(),
            total_downloads,
            rate_per_day: rate_per_day(&points, self.config.rate_window_days),
            chunks_cached,
            chunks_fetched,
        };

        log::debug!(
            target: LOG_TARGET,
            "Package '{}': {} downloads, {chunks_cached} chunk(s) cached, {chunks_fetched} fetched",
            stats.name,
            stats.total_downloads
        );

        Ok(Ok(stats))
    }
}

fn item_error(package: &PackageRef, key: &ChunkKey, result: ApiResult<Vec<DownloadPoint>>) -> ItemError {
    match result.into_item_result(&package.name) {
        Ok(_) => ItemError::new(&package.name, FailureKind::UpstreamUnavailable, format!("unexpected result for {key}")),
        Err(mut e) => {
            e.message = format!("{} ({key})", e.message);
            e
        }
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::registry::{Library, Org};
    use core::time::Duration;

    fn registry() -> Arc<Registry> {
        let orgs = vec![Org {
            id: "tanstack".into(),
            github: "TanStack".into(),
        }];
        let libraries = vec![Library {
            id: "query".into(),
            name: None,
            org: "tanstack".into(),
            repo: "TanStack/query".into(),
            packages: vec!["@tanstack/react-query".into()],
            legacy_packages: vec![],
            track_releases: true,
        }];
        Arc::new(Registry::new(orgs, libraries).unwrap())
    }

    fn refresher(store: CacheStore) -> NpmRefresher {
        let npm = NpmConfig {
            base_url: "http://127.0.0.1:9".into(),
            request_delay: Duration::ZERO,
            ..NpmConfig::default()
        };
        let http = HttpConfig {
            max_retries: 0,
            ..HttpConfig::default()
        };
        NpmRefresher::new(NpmClient::new(&npm, &http).unwrap(), store, registry(), npm)
    }

    #[tokio::test]
    async fn unknown_org_fails_the_run() {
        let refresher = refresher(CacheStore::in_memory());
        let _ = refresher.refresh_org_stats("nope", Utc::now()).await.unwrap_err();
    }

    #[tokio::test]
    async fn unavailable_store_fails_the_run() {
        let backend = crate::store::MemoryBackend::new();
        backend.set_available(false);
        let store = CacheStore::new(backend, crate::store::StalenessPolicy::default());

        let err = refresher(store).refresh_org_stats("tanstack", Utc::now()).await.unwrap_err();
        assert!(format!("{err:#}").contains("cached chunks"));
    }

    #[test]
    fn item_error_names_the_package_and_range() {
        let package = PackageRef {
            name: "@tanstack/react-query".into(),
            library_id: "query".into(),
        };
        let key = ChunkKey::new(
            &package.name,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        );

        let err = item_error(&package, &key, ApiResult::NotFound);
        assert_eq!(err.item, "@tanstack/react-query");
        assert_eq!(err.kind, FailureKind::UpstreamNotFound);
        assert!(err.message.contains("2024-01-01"));
    }
}
