use crate::Result;
use crate::config::{Config, ScheduleConfig};
use crate::feed::{ContentSource, FeedSynchronizer};
use crate::github::{GitHubClient, GitHubRefresher};
use crate::npm::{NpmClient, NpmRefresher};
use crate::registry::Registry;
use crate::store::CacheStore;
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use core::future::Future;
use core::time::Duration;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;

const LOG_TARGET: &str = "      jobs";

/// The recurring jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum JobKind {
    NpmStats,
    #[serde(rename = "github-stats")]
    #[strum(serialize = "github-stats")]
    GitHubStats,
    BlogSync,
    ReleaseSync,
}

impl JobKind {
    pub const ALL: [Self; 4] = [Self::NpmStats, Self::GitHubStats, Self::BlogSync, Self::ReleaseSync];

    /// How often the job runs.
    #[must_use]
    pub const fn cadence(self, schedule: &ScheduleConfig) -> Duration {
        match self {
            Self::NpmStats => schedule.npm_stats,
            Self::GitHubStats => schedule.github_stats,
            Self::BlogSync => schedule.blog_sync,
            Self::ReleaseSync => schedule.release_sync,
        }
    }
}

/// What one job run did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,

    /// Set when the run failed as a whole or timed out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The run's result payload.
    pub details: Value,
}

/// Everything needed to run the jobs against one store.
#[derive(Debug)]
pub struct Engine {
    npm: NpmRefresher,
    github: GitHubRefresher,
    feed: FeedSynchronizer,
    registry: Arc<Registry>,
    run_timeout: Duration,
}

impl Engine {
    #[must_use]
    pub const fn new(
        npm: NpmRefresher,
        github: GitHubRefresher,
        feed: FeedSynchronizer,
        registry: Arc<Registry>,
        run_timeout: Duration,
    ) -> Self {
        Self {
            npm,
            github,
            feed,
            registry,
            run_timeout,
        }
    }

    /// Wire up clients, refreshers and the synchronizer from a configuration.
    ///
    /// A relative blog directory resolves against `base_dir`.
    pub fn from_config(config: &Config, store: &CacheStore, github_token: Option<&str>, base_dir: &Utf8Path) -> Result<Self> {
        let registry = Arc::new(config.registry()?);
        let github_client = GitHubClient::new(&config.github, &config.http, github_token)?;

        let npm = NpmRefresher::new(
            NpmClient::new(&config.npm, &config.http)?,
            store.clone(),
            Arc::clone(&registry),
            config.npm.clone(),
        );

        let github = GitHubRefresher::new(github_client.clone(), store.clone(), Arc::clone(&registry), config.github.clone());

        let feed = FeedSynchronizer::new(
            store.clone(),
            Arc::clone(&registry),
            github_client,
            ContentSource::from_config(&config.feed.blog_source, &config.http, base_dir)?,
            config.feed.clone(),
            config.github.clone(),
        );

        Ok(Self::new(npm, github, feed, registry, config.schedule.run_timeout))
    }

    /// Run one job to completion or until the run timeout.
    pub async fn run_job(&self, kind: JobKind, now: DateTime<Utc>) -> JobSummary {
        match kind {
            JobKind::NpmStats => self.timed(kind.to_string(), now, self.npm_stats(now)).await,
            JobKind::GitHubStats => self.timed(kind.to_string(), now, self.github_stats(now)).await,
            JobKind::BlogSync => self.timed(kind.to_string(), now, self.blog_sync(now)).await,
            JobKind::ReleaseSync => self.run_release_sync(None, now).await,
        }
    }

    /// Release sync with an explicit lookback instead of the configured windows.
    pub async fn run_release_sync(&self, days_back: Option<u32>, now: DateTime<Utc>) -> JobSummary {
        self.timed(JobKind::ReleaseSync.to_string(), now, self.release_sync(days_back, now)).await
    }

    /// Releases then blog posts, reported together.
    pub async fn run_sync_all(&self, now: DateTime<Utc>) -> JobSummary {
        self.timed("sync-all".to_string(), now, self.sync_all(now)).await
    }

    /// Refresh npm stats of every tracked org. One org failing does not stop the others.
    async fn npm_stats(&self, now: DateTime<Utc>) -> Result<(bool, Value)> {
        let mut success = true;
        let mut details = serde_json::Map::new();

        for org in self.registry.orgs() {
            let value = match self.npm.refresh_org_stats(&org.id, now).await {
                Ok(outcome) => {
                    success &= outcome.is_success();
                    to_value(&outcome)
                }
                Err(e) => {
                    log::error!(target: LOG_TARGET, "npm refresh of org '{}' failed: {e:#}", org.id);
                    success = false;
                    json!({ "error": format!("{e:#}") })
                }
            };
            let _ = details.insert(org.id.clone(), value);
        }

        Ok((success, Value::Object(details)))
    }

    /// Refresh GitHub stats of every tracked org. One org failing does not stop the others.
    async fn github_stats(&self, now: DateTime<Utc>) -> Result<(bool, Value)> {
        let mut success = true;
        let mut details = serde_json::Map::new();

        for org in self.registry.orgs() {
            let value = match self.github.refresh_org_stats(&org.id, now).await {
                Ok(outcome) => {
                    success &= outcome.is_success();
                    to_value(&outcome)
                }
                Err(e) => {
                    log::error!(target: LOG_TARGET, "GitHub refresh of org '{}' failed: {e:#}", org.id);
                    success = false;
                    json!({ "error": format!("{e:#}") })
                }
            };
            let _ = details.insert(org.id.clone(), value);
        }

        Ok((success, Value::Object(details)))
    }

    async fn release_sync(&self, days_back: Option<u32>, now: DateTime<Utc>) -> Result<(bool, Value)> {
        let result = self.feed.sync_github_releases(days_back, now).await?;
        Ok((result.success(), to_value(&result)))
    }

    async fn blog_sync(&self, now: DateTime<Utc>) -> Result<(bool, Value)> {
        let result = self.feed.sync_blog_posts(now).await?;
        Ok((result.success(), to_value(&result)))
    }

    async fn sync_all(&self, now: DateTime<Utc>) -> Result<(bool, Value)> {
        let result = self.feed.sync_all(now).await?;
        Ok((result.success, to_value(&result)))
    }

    async fn timed(&self, job: String, now: DateTime<Utc>, run: impl Future<Output = Result<(bool, Value)>>) -> JobSummary {
        let started = Instant::now();
        log::info!(target: LOG_TARGET, "Starting job '{job}'");

        let (success, error, details) = match tokio::time::timeout(self.run_timeout, run).await {
            Ok(Ok((success, details))) => (success, None, details),
            Ok(Err(e)) => {
                log::error!(target: LOG_TARGET, "Job '{job}' failed: {e:#}");
                (false, Some(format!("{e:#}")), Value::Null)
            }
            Err(_elapsed) => {
                log::error!(target: LOG_TARGET, "Job '{job}' timed out after {:?}", self.run_timeout);
                (false, Some(format!("timed out after {:?}", self.run_timeout)), Value::Null)
            }
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(target: LOG_TARGET, "Finished job '{job}' in {duration_ms}ms (success: {success})");

        JobSummary {
            job,
            started_at: now,
            duration_ms,
            success,
            error,
            details,
        }
    }
}

fn to_value(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": format!("serializing result: {e}") }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlogSourceConfig;
    use crate::store::{Backend, MemoryBackend, StalenessPolicy};

    fn empty_engine(store: &CacheStore) -> Engine {
        let mut config = Config::default();
        config.orgs.clear();
        config.libraries.clear();
        config.feed.blog_source = BlogSourceConfig::None;
        Engine::from_config(&config, store, None, Utf8Path::new(".")).unwrap()
    }

    #[test]
    fn job_names_and_cadences() {
        let schedule = ScheduleConfig::default();
        assert_eq!(JobKind::NpmStats.to_string(), "npm-stats");
        assert_eq!(JobKind::GitHubStats.to_string(), "github-stats");
        assert_eq!(JobKind::BlogSync.cadence(&schedule), Duration::from_secs(300));
        assert_eq!(JobKind::ReleaseSync.cadence(&schedule), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn empty_registry_jobs_succeed() {
        let store = CacheStore::in_memory();
        let engine = empty_engine(&store);

        for kind in JobKind::ALL {
            let summary = engine.run_job(kind, Utc::now()).await;
            assert!(summary.success, "{kind} failed: {:?}", summary.error);
            assert!(summary.error.is_none());
        }
    }

    #[tokio::test]
    async fn store_outage_fails_the_release_job() {
        let backend = MemoryBackend::new();
        let store = CacheStore::new(Arc::clone(&backend) as Arc<dyn Backend>, StalenessPolicy::default());
        let engine = empty_engine(&store);
        backend.set_available(false);

        let summary = engine.run_job(JobKind::ReleaseSync, Utc::now()).await;
        assert!(!summary.success);
        assert!(summary.error.is_some());
        assert_eq!(summary.job, "release-sync");
    }

    #[tokio::test]
    async fn slow_job_times_out() {
        let store = CacheStore::in_memory();
        let mut engine = empty_engine(&store);
        engine.run_timeout = Duration::from_millis(10);

        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ohno::AppError>((true, Value::Null))
        };

        let summary = engine.timed("slow".to_string(), Utc::now(), slow).await;
        assert!(!summary.success);
        assert!(summary.error.unwrap().contains("timed out"));
    }
}
