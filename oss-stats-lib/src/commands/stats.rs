//! Commands that read cached stats.

use super::Host;
use super::common::{CommonArgs, Context, write_json};
use crate::Result;
use crate::query::{QueryError, fetch_recent_download_stats, get_oss_stats};
use clap::Parser;
use ohno::app_err;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Org to show (default is the first configured org)
    #[arg(long, value_name = "ORG")]
    pub org: Option<String>,
}

#[derive(Parser, Debug)]
pub struct DownloadsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Library to show
    #[arg(value_name = "LIBRARY")]
    pub library: String,

    /// Number of days ending today
    #[arg(long, value_name = "DAYS", default_value_t = 30)]
    pub days: u32,
}

pub fn show_stats<H: Host>(host: &mut H, args: &StatsArgs) -> Result<()> {
    let ctx = Context::new(&args.common)?;
    let registry = ctx.config.registry()?;

    let org_id = match &args.org {
        Some(org) => org.clone(),
        None => registry
            .orgs()
            .first()
            .map(|org| org.id.clone())
            .ok_or_else(|| app_err!("no orgs are configured"))?,
    };

    match get_oss_stats(&ctx.store, &registry, &org_id, host.now()) {
        Ok(stats) => write_json(host, &stats),
        Err(e @ QueryError::NoData(_)) => {
            let _ = writeln!(host.error(), "{e}");
            host.exit(1);
            Ok(())
        }
        Err(e) => Err(app_err!("{e}")),
    }
}

pub fn show_downloads<H: Host>(host: &mut H, args: &DownloadsArgs) -> Result<()> {
    let ctx = Context::new(&args.common)?;
    let registry = ctx.config.registry()?;
    let downloads = fetch_recent_download_stats(&ctx.store, &registry, &args.library, ctx.config.npm.history_start, args.days, host.now())?;
    write_json(host, &downloads)
}
