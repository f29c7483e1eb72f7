//! Command-line interface and orchestration for oss-stats
//!
//! Every command is meant to be triggered by an external scheduler (cron, a CI workflow, a
//! serverless timer) or run by hand. Job commands print a JSON summary and exit with status 1
//! when the run did not fully succeed, so the scheduler can alert on it.
//!
//! ## Commands
//!
//! - **refresh-npm**, **refresh-github**: Refresh org and library stats
//! - **sync-releases**, **sync-blog**, **sync-all**: Pull content into the feed
//! - **schedule**: Run every job on its cadence in-process
//! - **stats**, **downloads**, **feed**: Read what is cached
//! - **init**, **validate**: Manage the configuration file

mod common;
mod feed;
mod host;
mod init;
mod jobs;
mod run;
mod stats;
mod validate;

pub use common::{CommonArgs, LogLevel};
pub use feed::{FeedArgs, process_feed};
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use run::run;
pub use stats::{DownloadsArgs, StatsArgs, show_downloads, show_stats};
pub use validate::{ValidateArgs, validate_config};
