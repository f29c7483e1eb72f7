//! Commands that read and edit the feed.

use super::Host;
use super::common::{CommonArgs, Context, write_json};
use crate::Result;
use crate::feed::{ManualEntryInput, SubmitError, delete_manual_entry, submit_manual_entry};
use crate::model::{FeedCategory, FeedSource, ReleaseLevel};
use crate::query::{FeedQuery, Visibility, get_feed_facet_counts, list_feed_entries};
use crate::ratelimit::RateLimiter;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use ohno::IntoAppError;
use std::fs;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct FeedArgs {
    #[command(subcommand)]
    pub command: FeedCommand,
}

#[derive(Subcommand, Debug)]
pub enum FeedCommand {
    /// List feed entries, newest first
    List(FeedListArgs),
    /// Count feed entries per source, category, library, tag and release level
    Facets(FeedFacetsArgs),
    /// Create or replace a manual announcement from a JSON file
    Add(FeedAddArgs),
    /// Delete a manual announcement
    Remove(FeedRemoveArgs),
}

/// Feed filters shared by listing and facet counting
#[derive(Args, Debug, Clone)]
pub struct FeedFilterArgs {
    /// Only entries from these sources
    #[arg(long, value_name = "SOURCE", value_delimiter = ',', help_heading = "Filters")]
    pub source: Vec<FeedSource>,

    /// Only entries in these categories
    #[arg(long, value_name = "CATEGORY", value_delimiter = ',', help_heading = "Filters")]
    pub category: Vec<FeedCategory>,

    /// Only entries about these libraries
    #[arg(long, value_name = "LIBRARY", value_delimiter = ',', help_heading = "Filters")]
    pub library: Vec<String>,

    /// Only entries about these partners
    #[arg(long, value_name = "PARTNER", value_delimiter = ',', help_heading = "Filters")]
    pub partner: Vec<String>,

    /// Only entries with these tags
    #[arg(long, value_name = "TAG", value_delimiter = ',', help_heading = "Filters")]
    pub tag: Vec<String>,

    /// Only releases of these levels
    #[arg(long, value_name = "LEVEL", value_delimiter = ',', help_heading = "Filters")]
    pub release_level: Vec<ReleaseLevel>,

    /// Only entries whose title, excerpt or content contains this text
    #[arg(long, value_name = "TEXT", help_heading = "Filters")]
    pub search: Option<String>,

    /// Which entries to include by visibility
    #[arg(long, value_name = "VISIBILITY", default_value = "visible", help_heading = "Filters")]
    pub visibility: Visibility,

    /// Only featured (or only non-featured) entries
    #[arg(long, value_name = "BOOL", help_heading = "Filters")]
    pub featured: Option<bool>,
}

impl FeedFilterArgs {
    fn to_query(&self, page: usize, page_size: usize) -> FeedQuery {
        FeedQuery {
            sources: self.source.clone(),
            categories: self.category.clone(),
            library_ids: self.library.clone(),
            partner_ids: self.partner.clone(),
            tags: self.tag.clone(),
            release_levels: self.release_level.clone(),
            search: self.search.clone(),
            visibility: self.visibility,
            featured: self.featured,
            page,
            page_size,
        }
    }
}

#[derive(Parser, Debug)]
pub struct FeedListArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub filters: FeedFilterArgs,

    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Entries per page
    #[arg(long, default_value_t = 20)]
    pub page_size: usize,
}

#[derive(Parser, Debug)]
pub struct FeedFacetsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub filters: FeedFilterArgs,
}

#[derive(Parser, Debug)]
pub struct FeedAddArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// JSON file describing the entry
    #[arg(value_name = "PATH")]
    pub file: Utf8PathBuf,

    /// Who is submitting the entry, for rate limiting
    #[arg(long, value_name = "NAME", default_value = "cli")]
    pub submitter: String,
}

#[derive(Parser, Debug)]
pub struct FeedRemoveArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Entry id, such as `announcement:20240501-workshop`
    #[arg(value_name = "ID")]
    pub id: String,
}

pub fn process_feed<H: Host>(host: &mut H, args: &FeedArgs) -> Result<()> {
    match &args.command {
        FeedCommand::List(list) => {
            let ctx = Context::new(&list.common)?;
            let page = list_feed_entries(&ctx.store, &list.filters.to_query(list.page, list.page_size))?;
            write_json(host, &page)
        }

        FeedCommand::Facets(facets) => {
            let ctx = Context::new(&facets.common)?;
            let counts = get_feed_facet_counts(&ctx.store, &facets.filters.to_query(1, 0))?;
            write_json(host, &counts)
        }

        FeedCommand::Add(add) => {
            let ctx = Context::new(&add.common)?;
            let text = fs::read_to_string(&add.file).into_app_err_with(|| format!("reading '{}'", add.file))?;
            let input: ManualEntryInput = serde_json::from_str(&text).into_app_err_with(|| format!("parsing '{}'", add.file))?;

            let registry = ctx.config.registry()?;
            let limiter = RateLimiter::new();
            match submit_manual_entry(&limiter, &add.submitter, &ctx.store, &registry, input, ctx.config.feed.excerpt_length, host.now()) {
                Ok(entry) => write_json(host, &entry),
                Err(e @ SubmitError::RateLimited(_)) => {
                    let _ = writeln!(host.error(), "{e}");
                    host.exit(1);
                    Ok(())
                }
                Err(SubmitError::Rejected(e)) => Err(e),
            }
        }

        FeedCommand::Remove(remove) => {
            let ctx = Context::new(&remove.common)?;
            if delete_manual_entry(&ctx.store, &remove.id)? {
                let _ = writeln!(host.output(), "Deleted '{}'", remove.id);
            } else {
                let _ = writeln!(host.error(), "No entry '{}'", remove.id);
                host.exit(1);
            }
            Ok(())
        }
    }
}
