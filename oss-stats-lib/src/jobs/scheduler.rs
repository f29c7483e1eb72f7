use super::{Engine, JobKind, JobSummary};
use crate::config::ScheduleConfig;
use chrono::Utc;
use core::future::Future;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

const LOG_TARGET: &str = "      jobs";

/// Fires every job on its cadence until shut down.
#[derive(Debug)]
pub struct Scheduler {
    engine: Arc<Engine>,
    schedule: ScheduleConfig,
}

impl Scheduler {
    #[must_use]
    pub const fn new(engine: Arc<Engine>, schedule: ScheduleConfig) -> Self {
        Self { engine, schedule }
    }

    /// Run every job once right away and then on its cadence, until `shutdown` completes.
    ///
    /// Each job has its own loop, so a slow job never delays the others and never overlaps
    /// with itself. Summaries are sent to `summaries` as runs finish. In-flight runs are
    /// allowed to finish before this returns.
    pub async fn run(self, shutdown: impl Future<Output = ()>, summaries: mpsc::UnboundedSender<JobSummary>) {
        let (stop_tx, stop_rx) = watch::channel(false);

        let loops: Vec<_> = JobKind::ALL
            .into_iter()
            .map(|kind| {
                let engine = Arc::clone(&self.engine);
                let summaries = summaries.clone();
                let mut stop = stop_rx.clone();
                let period = kind.cadence(&self.schedule);

                tokio::spawn(async move {
                    log::info!(target: LOG_TARGET, "Scheduling job '{kind}' every {period:?}");

                    let mut interval = tokio::time::interval(period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

                    loop {
                        tokio::select! {
                            _ = interval.tick() => {
                                let summary = engine.run_job(kind, Utc::now()).await;
                                let _ = summaries.send(summary);
                            }
                            _ = stop.changed() => break,
                        }
                    }
                })
            })
            .collect();

        drop(summaries);
        shutdown.await;
        log::info!(target: LOG_TARGET, "Shutting down, waiting for running jobs to finish");

        let _ = stop_tx.send(true);
        for joined in join_all(loops).await {
            if let Err(e) = joined {
                log::error!(target: LOG_TARGET, "Job loop ended abnormally: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BlogSourceConfig, Config};
    use crate::store::CacheStore;
    use camino::Utf8Path;
    use core::time::Duration;
    use std::collections::HashSet;

    #[tokio::test]
    async fn every_job_runs_then_shuts_down() {
        let mut config = Config::default();
        config.orgs.clear();
        config.libraries.clear();
        config.feed.blog_source = BlogSourceConfig::None;

        let store = CacheStore::in_memory();
        let engine = Arc::new(Engine::from_config(&config, &store, None, Utf8Path::new(".")).unwrap());
        let scheduler = Scheduler::new(engine, config.schedule);

        let (tx, mut rx) = mpsc::unbounded_channel();
        scheduler.run(tokio::time::sleep(Duration::from_millis(200)), tx).await;

        let mut seen = HashSet::new();
        while let Some(summary) = rx.recv().await {
            assert!(summary.success, "{} failed: {:?}", summary.job, summary.error);
            let _ = seen.insert(summary.job);
        }

        assert_eq!(seen.len(), 4);
        assert!(seen.contains("npm-stats"));
        assert!(seen.contains("github-stats"));
    }
}
