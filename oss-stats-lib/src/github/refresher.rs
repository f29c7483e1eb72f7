use super::client::{Contributor, GitHubClient, OrgInfo, PAGE_SIZE, Page, RepoInfo, fetch_with_retry};
use super::dependents::fetch_dependents_count;
use crate::Result;
use crate::config::GitHubConfig;
use crate::error::{FailureKind, ItemError};
use crate::http::Throttler;
use crate::model::{GitHubStats, RefreshOutcome, StatsScope};
use crate::registry::{Registry, RepoRef};
use crate::store::CacheStore;
use chrono::{DateTime, Utc};
use core::time::Duration;
use futures_util::future::join_all;
use ohno::bail;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

const LOG_TARGET: &str = "    github";

/// Upper bound on pages read when listing an org's repositories.
const MAX_ORG_REPO_PAGES: u32 = 50;

pub type GitHubRefreshOutcome = RefreshOutcome<GitHubStats, GitHubStats, RepoStats>;

/// Metrics of one tracked repository, as gathered by a refresh run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStats {
    pub repo: String,
    pub star_count: u64,
    pub fork_count: u64,
    pub contributor_count: u64,
    pub dependent_count: Option<u64>,

    #[serde(skip)]
    contributors: BTreeSet<String>,
}

/// Org-wide totals from the org endpoints.
#[derive(Debug)]
struct OrgTotals {
    repository_count: u64,
    star_count: u64,
    fork_count: u64,
}

/// Refreshes GitHub stats for the orgs of a registry.
#[derive(Debug, Clone)]
pub struct GitHubRefresher {
    client: GitHubClient,
    store: CacheStore,
    registry: Arc<Registry>,
    config: GitHubConfig,
}

impl GitHubRefresher {
    #[must_use]
    pub const fn new(client: GitHubClient, store: CacheStore, registry: Arc<Registry>, config: GitHubConfig) -> Self {
        Self {
            client,
            store,
            registry,
            config,
        }
    }

    /// Refresh the org row and one row per tracked library of the org.
    ///
    /// A repository shared by several libraries is fetched once. The org row is written only when
    /// the org endpoints answered and at least one tracked repository was refreshed.
    pub async fn refresh_org_stats(&self, org_id: &str, now: DateTime<Utc>) -> Result<GitHubRefreshOutcome> {
        let started = Instant::now();

        let Some(org) = self.registry.org(org_id) else {
            bail!("unknown org '{org_id}'");
        };

        let throttler = Throttler::new(self.config.concurrency, Duration::ZERO);

        let mut repos: Vec<RepoRef> = Vec::new();
        let mut library_repos = Vec::new();
        let mut errors = Vec::new();
        for library in self.registry.libraries_for_org(org_id) {
            let Some(repo) = library.repo_ref() else {
                errors.push(ItemError::new(&library.id, FailureKind::Validation, format!("malformed repository '{}'", library.repo)));
                continue;
            };

            if !repos.contains(&repo) {
                repos.push(repo.clone());
            }
            library_repos.push((library.id.clone(), repo));
        }

        log::info!(target: LOG_TARGET, "Refreshing GitHub stats for org '{}' and {} repository(ies)", org.github, repos.len());

        let (org_totals, repo_results) = tokio::join!(
            self.fetch_org_totals(&org.github, &throttler),
            join_all(repos.iter().map(|repo| self.fetch_repo_stats(repo, &throttler)))
        );

        let mut by_repo: HashMap<RepoRef, RepoStats> = HashMap::new();
        for (repo, result) in repos.iter().zip(repo_results) {
            match result {
                Ok(stats) => {
                    let _ = by_repo.insert(repo.clone(), stats);
                }
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "Could not refresh GitHub stats of {e}");
                    errors.push(e);
                }
            }
        }

        let library_results: Vec<GitHubStats> = library_repos
            .iter()
            .filter_map(|(library_id, repo)| {
                by_repo.get(repo).map(|stats| GitHubStats {
                    scope: StatsScope::Library(library_id.clone()),
                    star_count: stats.star_count,
                    contributor_count: stats.contributor_count,
                    dependent_count: stats.dependent_count,
                    fork_count: Some(stats.fork_count),
                    repository_count: None,
                    updated_at: now,
                })
            })
            .collect();

        let org_stats = match org_totals {
            Ok(totals) if !by_repo.is_empty() || repos.is_empty() => {
                let contributors: BTreeSet<&str> = by_repo.values().flat_map(|s| s.contributors.iter().map(String::as_str)).collect();
                let dependents: Vec<u64> = by_repo.values().filter_map(|s| s.dependent_count).collect();

                Some(GitHubStats {
                    scope: StatsScope::Org(org_id.to_string()),
                    star_count: totals.star_count,
                    contributor_count: contributors.len() as u64,
                    dependent_count: (!dependents.is_empty()).then(|| dependents.iter().sum()),
                    fork_count: Some(totals.fork_count),
                    repository_count: Some(totals.repository_count),
                    updated_at: now,
                })
            }
            Ok(_) => {
                log::error!(target: LOG_TARGET, "Every repository of org '{org_id}' failed, keeping the cached org row");
                None
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not refresh GitHub stats of {e}");
                errors.push(e);
                None
            }
        };

        for stats in &library_results {
            self.store.set(stats)?;
        }

        if let Some(stats) = &org_stats {
            self.store.set(stats)?;
            log::info!(
                target: LOG_TARGET,
                "Org '{org_id}' has {} stars across {} repositories, {} contributors",
                stats.star_count,
                stats.repository_count.unwrap_or_default(),
                stats.contributor_count
            );
        }

        let item_results: Vec<RepoStats> = repos.iter().filter_map(|repo| by_repo.remove(repo)).collect();

        Ok(RefreshOutcome {
            org_stats,
            library_results,
            library_errors: errors,
            item_results,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn fetch_org_totals(&self, login: &str, throttler: &Arc<Throttler>) -> Result<OrgTotals, ItemError> {
        let max_wait = self.config.max_rate_limit_wait;

        log::info!(target: LOG_TARGET, "Querying GitHub for information on org '{login}'");
        let url = self.client.api_url(&format!("/orgs/{login}"));
        let info: OrgInfo = fetch_with_retry(throttler, max_wait, login, || self.client.get_json(&url))
            .await
            .into_item_result(login)?;

        let mut star_count = 0;
        let mut fork_count = 0;
        let mut listed = 0;
        let mut page_num = 1;
        loop {
            let url = self
                .client
                .api_url(&format!("/orgs/{login}/repos?type=public&per_page={PAGE_SIZE}&page={page_num}"));
            let page: Page<RepoInfo> = fetch_with_retry(throttler, max_wait, login, || self.client.get_page(&url))
                .await
                .into_item_result(login)?;

            listed += page.items.len() as u64;
            for repo in &page.items {
                star_count += repo.stargazers_count.unwrap_or(0);
                fork_count += repo.forks_count.unwrap_or(0);
            }

            if !page.has_next || page.items.is_empty() {
                break;
            }

            page_num += 1;
            if page_num > MAX_ORG_REPO_PAGES {
                log::debug!(target: LOG_TARGET, "Reached maximum repository page limit ({MAX_ORG_REPO_PAGES}) for org '{login}'");
                break;
            }
        }

        Ok(OrgTotals {
            repository_count: info.public_repos.unwrap_or(listed),
            star_count,
            fork_count,
        })
    }

    async fn fetch_repo_stats(&self, repo: &RepoRef, throttler: &Arc<Throttler>) -> Result<RepoStats, ItemError> {
        let max_wait = self.config.max_rate_limit_wait;
        let item = repo.to_string();

        log::info!(target: LOG_TARGET, "Querying GitHub for information on repository '{repo}'");
        let url = self.client.api_url(&format!("/repos/{}/{}", repo.owner, repo.name));
        let info: RepoInfo = fetch_with_retry(throttler, max_wait, &item, || self.client.get_json(&url))
            .await
            .into_item_result(&item)?;

        let mut contributors = BTreeSet::new();
        let mut page_num = 1;
        loop {
            let url = self.client.api_url(&format!(
                "/repos/{}/{}/contributors?per_page={PAGE_SIZE}&page={page_num}",
                repo.owner, repo.name
            ));
            let page: Page<Contributor> = fetch_with_retry(throttler, max_wait, &item, || self.client.get_page(&url))
                .await
                .into_item_result(&item)?;

            let has_next = page.has_next && !page.items.is_empty();
            contributors.extend(page.items.into_iter().filter_map(|c| c.login));

            if !has_next {
                break;
            }

            page_num += 1;
            if page_num > self.config.max_contributor_pages {
                log::debug!(
                    target: LOG_TARGET,
                    "Reached maximum contributor page limit ({}) for '{repo}', stopping after {} contributors",
                    self.config.max_contributor_pages,
                    contributors.len()
                );
                break;
            }
        }

        let dependent_count = if self.config.fetch_dependents {
            let _permit = throttler.acquire().await;
            fetch_dependents_count(&self.client, repo).await
        } else {
            None
        };

        Ok(RepoStats {
            repo: item,
            star_count: info.stargazers_count.unwrap_or(0),
            fork_count: info.forks_count.unwrap_or(0),
            contributor_count: contributors.len() as u64,
            dependent_count,
            contributors,
        })
    }
}
