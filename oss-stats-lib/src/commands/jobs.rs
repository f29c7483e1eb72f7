//! Commands that run refresh and sync jobs.

use super::Host;
use super::common::{CommonArgs, Context, write_json};
use crate::Result;
use crate::jobs::{Engine, JobKind, JobSummary, Scheduler};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
pub struct JobArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
pub struct SyncReleasesArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Look back this many days instead of the configured windows
    #[arg(long, value_name = "DAYS")]
    pub days_back: Option<u32>,
}

/// The single-run jobs reachable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneShot {
    Job(JobKind),
    ReleaseSync(Option<u32>),
    SyncAll,
}

fn engine(ctx: &Context, args: &CommonArgs) -> Result<Engine> {
    Engine::from_config(&ctx.config, &ctx.store, args.github_token.as_deref(), &ctx.base_dir)
}

fn report<H: Host>(host: &mut H, summary: &JobSummary) -> Result<()> {
    write_json(host, summary)?;
    if !summary.success {
        host.exit(1);
    }
    Ok(())
}

/// Run one job and print its summary. Exits with status 1 when the job did not fully succeed.
pub async fn run_once<H: Host>(host: &mut H, args: &CommonArgs, job: OneShot) -> Result<()> {
    let ctx = Context::new(args)?;
    let engine = engine(&ctx, args)?;
    let now = host.now();

    let summary = match job {
        OneShot::Job(kind) => engine.run_job(kind, now).await,
        OneShot::ReleaseSync(days_back) => engine.run_release_sync(days_back, now).await,
        OneShot::SyncAll => engine.run_sync_all(now).await,
    };

    report(host, &summary)
}

/// Run every job on its cadence until Ctrl-C, printing each summary as it completes.
pub async fn schedule<H: Host>(host: &mut H, args: &JobArgs) -> Result<()> {
    let ctx = Context::new(&args.common)?;
    let engine = Arc::new(engine(&ctx, &args.common)?);
    let scheduler = Scheduler::new(engine, ctx.config.schedule);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Unable to listen for Ctrl-C: {e}");
        }
    };

    let _ = writeln!(host.error(), "Running scheduled jobs, press Ctrl-C to stop");

    let (tx, mut rx) = mpsc::unbounded_channel::<JobSummary>();
    let print = async {
        while let Some(summary) = rx.recv().await {
            if let Err(e) = write_json(host, &summary) {
                log::error!("Unable to print summary of job '{}': {e:#}", summary.job);
            }
        }
    };

    let ((), ()) = tokio::join!(scheduler.run(shutdown, tx), print);
    Ok(())
}
