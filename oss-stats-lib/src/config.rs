//! Configuration file handling.
//!
//! The configuration is a TOML file, `oss-stats.toml` in the working directory by default.
//! Missing sections and fields take the values of the embedded default configuration.

use crate::Result;
use crate::registry::{Library, Org, Registry};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use core::time::Duration;
use ohno::{EnrichableExt, IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../default_config.toml");

/// File name looked up in the base directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "oss-stats.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub npm: NpmConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Tracked orgs
    #[serde(default)]
    pub orgs: Vec<Org>,

    /// Tracked libraries, in registration order
    #[serde(default)]
    pub libraries: Vec<Library>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory of the file-backed store
    pub directory: Option<Utf8PathBuf>,

    /// Duration org and library stats stay fresh
    #[serde(with = "humantime_serde")]
    pub stats_freshness: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: None,
            stats_freshness: Duration::from_secs(6 * 3600),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NpmConfig {
    pub base_url: String,

    /// Maximum number of packages fetched at once
    pub concurrency: usize,

    /// Minimum spacing between two request dispatches
    #[serde(with = "humantime_serde")]
    pub request_delay: Duration,

    /// First day of download history
    pub history_start: NaiveDate,

    /// Number of trailing days the growth rate is computed over
    pub rate_window_days: u32,
}

impl Default for NpmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.npmjs.org".to_string(),
            concurrency: 8,
            request_delay: Duration::from_millis(500),
            history_start: NaiveDate::from_ymd_opt(2015, 1, 10).unwrap_or_default(),
            rate_window_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubConfig {
    pub api_base_url: String,

    /// Base of the web surface dependents are scraped from
    pub web_base_url: String,

    pub concurrency: usize,

    /// Page cap when listing contributors of one repository
    pub max_contributor_pages: u32,

    pub fetch_dependents: bool,

    /// Longest pause honoured when a rate limit is exhausted
    #[serde(with = "humantime_serde")]
    pub max_rate_limit_wait: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            web_base_url: "https://github.com".to_string(),
            concurrency: 5,
            max_contributor_pages: 10,
            fetch_dependents: true,
            max_rate_limit_wait: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Bound on one upstream call, retries included
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Retries on top of the original attempt
    pub max_retries: u32,

    /// First backoff delay, doubled on every retry
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Where blog posts are enumerated from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlogSourceConfig {
    /// A JSON index served over HTTP
    Http { url: String },

    /// A directory of markdown files with YAML front matter
    Directory { path: Utf8PathBuf },

    /// Blog sync disabled
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    /// Release lookback on a regular run
    #[serde(with = "humantime_serde")]
    pub release_lookback: Duration,

    /// Release lookback for a repository with no synced release yet
    #[serde(with = "humantime_serde")]
    pub cold_start_lookback: Duration,

    /// Maximum excerpt length in characters, before the ellipsis
    pub excerpt_length: usize,

    /// Public site, used to build "Read more" links
    pub site_url: String,

    pub blog_source: BlogSourceConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            release_lookback: Duration::from_secs(48 * 3600),
            cold_start_lookback: Duration::from_secs(30 * 24 * 3600),
            excerpt_length: 200,
            site_url: "https://tanstack.com".to_string(),
            blog_source: BlogSourceConfig::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    #[serde(with = "humantime_serde")]
    pub npm_stats: Duration,

    #[serde(with = "humantime_serde")]
    pub github_stats: Duration,

    #[serde(with = "humantime_serde")]
    pub blog_sync: Duration,

    #[serde(with = "humantime_serde")]
    pub release_sync: Duration,

    /// Bound on a single job run
    #[serde(with = "humantime_serde")]
    pub run_timeout: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            npm_stats: Duration::from_secs(6 * 3600),
            github_stats: Duration::from_secs(6 * 3600),
            blog_sync: Duration::from_secs(5 * 60),
            release_sync: Duration::from_secs(3600),
            run_timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// When `config_path` is `None`, `oss-stats.toml` in `base_dir` is used if it exists.
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{path}'"))?;
            (path.clone(), text)
        } else {
            let path = base_dir.join(DEFAULT_CONFIG_FILE);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // No config file found, use defaults
                    return Ok(Self::default());
                }
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration file '{path}'")),
            }
        };

        Self::parse(&text).map_err(|e| e.enrich_with(|| format!("loading configuration file '{final_path}'")))
    }

    /// Parse and validate configuration text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).into_app_err("parsing configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Save the default configuration to a TOML file
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Build the registry of tracked orgs and libraries.
    pub fn registry(&self) -> Result<Registry> {
        Registry::new(self.orgs.clone(), self.libraries.clone())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.npm.concurrency == 0 {
            return Err(app_err!("npm.concurrency must be at least 1"));
        }

        if self.github.concurrency == 0 {
            return Err(app_err!("github.concurrency must be at least 1"));
        }

        if self.npm.rate_window_days == 0 {
            return Err(app_err!("npm.rate_window_days must be at least 1"));
        }

        if self.feed.excerpt_length == 0 {
            return Err(app_err!("feed.excerpt_length must be at least 1"));
        }

        if self.http.request_timeout.is_zero() {
            return Err(app_err!("http.request_timeout must be greater than zero"));
        }

        for (name, cadence) in [
            ("schedule.npm_stats", self.schedule.npm_stats),
            ("schedule.github_stats", self.schedule.github_stats),
            ("schedule.blog_sync", self.schedule.blog_sync),
            ("schedule.release_sync", self.schedule.release_sync),
            ("schedule.run_timeout", self.schedule.run_timeout),
        ] {
            if cadence.is_zero() {
                return Err(app_err!("{name} must be greater than zero"));
            }
        }

        for (name, value) in [
            ("npm.base_url", &self.npm.base_url),
            ("github.api_base_url", &self.github.api_base_url),
            ("github.web_base_url", &self.github.web_base_url),
            ("feed.site_url", &self.feed.site_url),
        ] {
            let _ = url::Url::parse(value).into_app_err_with(|| format!("{name} is not a valid URL: '{value}'"))?;
        }

        if let BlogSourceConfig::Http { url } = &self.feed.blog_source {
            let _ = url::Url::parse(url).into_app_err_with(|| format!("feed.blog_source.url is not a valid URL: '{url}'"))?;
        }

        let _ = self.registry()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}
