//! Setup shared by the commands: logging, configuration, the store and JSON output.

use super::Host;
use crate::Result;
use crate::config::Config;
use crate::store::{CacheStore, StalenessPolicy};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, ValueEnum};
use directories::BaseDirs;
use ohno::IntoAppError;
use serde::Serialize;
use std::io::Write;

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

/// Arguments shared by every command that touches the store
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Path to configuration file (default is `oss-stats.toml`)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Directory holding the cache store
    #[arg(long, value_name = "PATH")]
    pub store_dir: Option<Utf8PathBuf>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none", global = true)]
    pub log_level: LogLevel,
}

/// Loaded configuration and opened store
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub store: CacheStore,
    pub base_dir: Utf8PathBuf,
}

impl Context {
    pub fn new(args: &CommonArgs) -> Result<Self> {
        init_logging(args.log_level);

        let base_dir = Utf8PathBuf::from(".");
        let config = Config::load(&base_dir, args.config.as_ref())?;
        let store_dir = store_dir(&base_dir, args.store_dir.as_ref(), config.store.directory.as_ref())?;

        log::debug!("Using cache store at '{store_dir}'");
        let store = CacheStore::open(store_dir, StalenessPolicy::new(config.store.stats_freshness))?;

        Ok(Self { config, store, base_dir })
    }
}

/// The command-line directory wins over the configured one; without either, the platform
/// data directory is used.
fn store_dir(base_dir: &Utf8Path, from_args: Option<&Utf8PathBuf>, from_config: Option<&Utf8PathBuf>) -> Result<Utf8PathBuf> {
    if let Some(dir) = from_args {
        return Ok(dir.clone());
    }

    if let Some(dir) = from_config {
        return Ok(base_dir.join(dir));
    }

    let data_dir = BaseDirs::new()
        .into_app_err("could not determine data directory")?
        .data_dir()
        .join("oss-stats");

    Utf8PathBuf::from_path_buf(data_dir).map_err(|path| ohno::app_err!("data directory '{}' is not valid UTF-8", path.display()))
}

pub fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    // A second initialisation in the same process is harmless
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .try_init();
}

/// Print a value as pretty JSON on the host's output.
pub fn write_json<H: Host>(host: &mut H, value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).into_app_err("serializing output")?;
    let _ = writeln!(host.output(), "{text}");
    Ok(())
}
