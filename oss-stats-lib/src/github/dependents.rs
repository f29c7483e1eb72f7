//! Dependents count, scraped from the repository's "Used by" web page.
//!
//! There is no API for this number. The page is best-effort: any failure to fetch or parse
//! it yields `None` and is never reported as an error.

use super::client::GitHubClient;
use crate::http::ApiResult;
use crate::registry::RepoRef;
use regex::Regex;
use std::sync::LazyLock;

const LOG_TARGET: &str = "    github";

static REPOSITORIES_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([\d,]+)\s*Repositories").expect("invalid regex"));

/// Extract the repository dependents count from the dependents page HTML.
#[must_use]
pub fn parse_dependents_count(html: &str) -> Option<u64> {
    let caps = REPOSITORIES_REGEX.captures(html)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

/// Fetch the dependents count of a repository.
pub async fn fetch_dependents_count(client: &GitHubClient, repo: &RepoRef) -> Option<u64> {
    let url = client.web_url(&format!("/{}/{}/network/dependents", repo.owner, repo.name));
    log::debug!(target: LOG_TARGET, "Scraping dependents of '{repo}'");

    match client.get_text(&url).await {
        ApiResult::Success(html) => {
            let count = parse_dependents_count(&html);
            if count.is_none() {
                log::debug!(target: LOG_TARGET, "No dependents count found on the page for '{repo}'");
            }
            count
        }
        ApiResult::NotFound => None,
        ApiResult::RateLimited(_) => {
            log::debug!(target: LOG_TARGET, "Rate limited while scraping dependents of '{repo}'");
            None
        }
        ApiResult::Failed(e) => {
            log::debug!(target: LOG_TARGET, "Could not scrape dependents of '{repo}': {e:#}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dependents_count() {
        let html = r#"
            <a class="btn-link selected" href="/TanStack/query/network/dependents?dependent_type=REPOSITORY">
              <svg aria-hidden="true" class="octicon octicon-code-square"></svg>
              1,234,567
              Repositories
            </a>
            <a class="btn-link" href="/TanStack/query/network/dependents?dependent_type=PACKAGE">
              8,901
              Packages
            </a>
        "#;
        assert_eq!(parse_dependents_count(html), Some(1_234_567));
    }

    #[test]
    fn test_parse_dependents_count_absent() {
        assert_eq!(parse_dependents_count("<html><body>Not here</body></html>"), None);
    }
}
