//! Command dispatch logic for oss-stats

use super::jobs::{JobArgs, OneShot, SyncReleasesArgs, run_once, schedule};
use super::{DownloadsArgs, FeedArgs, InitArgs, StatsArgs, ValidateArgs, init_config, process_feed, show_downloads, show_stats, validate_config};
use crate::jobs::JobKind;
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "oss-stats", author, version, long_about = None)]
#[command(about = "Keep npm, GitHub and feed statistics fresh and cheap to serve")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh npm download stats of every tracked org
    RefreshNpm(JobArgs),
    /// Refresh GitHub stats of every tracked org
    RefreshGithub(JobArgs),
    /// Sync GitHub releases into the feed
    SyncReleases(SyncReleasesArgs),
    /// Sync blog posts into the feed
    SyncBlog(JobArgs),
    /// Sync releases and blog posts
    SyncAll(JobArgs),
    /// Run every job on its cadence until interrupted
    Schedule(JobArgs),
    /// Show cached stats of an org
    Stats(StatsArgs),
    /// Show recent daily downloads of a library
    Downloads(DownloadsArgs),
    /// Read or edit the feed
    Feed(FeedArgs),
    /// Generate a default configuration file
    Init(InitArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// This function parses the command-line arguments and executes the corresponding
/// subcommand. It's designed to be called from main.rs with the program arguments.
///
/// # Errors
///
/// Returns an error if command parsing fails or if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        Command::RefreshNpm(args) => run_once(host, &args.common, OneShot::Job(JobKind::NpmStats)).await,
        Command::RefreshGithub(args) => run_once(host, &args.common, OneShot::Job(JobKind::GitHubStats)).await,
        Command::SyncReleases(args) => run_once(host, &args.common, OneShot::ReleaseSync(args.days_back)).await,
        Command::SyncBlog(args) => run_once(host, &args.common, OneShot::Job(JobKind::BlogSync)).await,
        Command::SyncAll(args) => run_once(host, &args.common, OneShot::SyncAll).await,
        Command::Schedule(args) => schedule(host, args).await,
        Command::Stats(args) => show_stats(host, args),
        Command::Downloads(args) => show_downloads(host, args),
        Command::Feed(args) => process_feed(host, args),
        Command::Init(args) => init_config(host, args),
        Command::Validate(args) => validate_config(host, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::feed::FeedCommand;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sync_releases_with_days_back() {
        let cli = Cli::try_parse_from(["oss-stats", "sync-releases", "--days-back", "7"]).unwrap();
        match cli.command {
            Command::SyncReleases(args) => assert_eq!(args.days_back, Some(7)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_feed_filters() {
        let cli = Cli::try_parse_from([
            "oss-stats",
            "feed",
            "list",
            "--source",
            "github,blog",
            "--release-level",
            "major",
            "--visibility",
            "all",
        ])
        .unwrap();

        let Command::Feed(feed) = cli.command else {
            panic!("expected feed command");
        };
        let FeedCommand::List(list) = feed.command else {
            panic!("expected feed list");
        };
        assert_eq!(list.filters.source.len(), 2);
        assert_eq!(list.filters.visibility, crate::query::Visibility::All);
        assert_eq!(list.page, 1);
    }
}
