//! GitHub API client
//!
//! Minimal GitHub client for the org, repository, contributor and release endpoints, plus
//! plain page fetches from the web surface.

use crate::Result;
use crate::config::{GitHubConfig, HttpConfig};
use crate::http::{ApiResult, RateLimitInfo, RetryPolicy, Throttler, build_client, classify_response, resilient_get};
use chrono::{DateTime, Utc};
use core::future::Future;
use core::time::Duration;
use reqwest::StatusCode;
use reqwest::header::LINK;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

const LOG_TARGET: &str = "    github";

/// Page size used for every paginated listing.
pub const PAGE_SIZE: u32 = 100;

/// How many times one call is re-issued after hitting a rate limit.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
pub struct OrgInfo {
    pub public_repos: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[expect(clippy::struct_field_names, reason = "field names match GitHub API exactly")]
pub struct RepoInfo {
    pub stargazers_count: Option<u64>,
    pub forks_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Contributor {
    /// Absent for anonymous contributors
    pub login: Option<String>,
    #[serde(default)]
    pub contributions: u64,
}

/// Minimal GitHub release with only the fields we need
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Release {
    /// When the release went public, falling back to its creation time for unpublished ones.
    #[must_use]
    pub fn published(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

/// A page of a listing, with whether the upstream advertised another one.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next: bool,
}

#[derive(Debug, Clone)]
#[expect(clippy::struct_field_names, reason = "client field stores the underlying HTTP client")]
pub struct GitHubClient {
    client: reqwest::Client,
    api_base_url: String,
    web_base_url: String,
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Create a client, authenticating with `token` when one is given
    pub fn new(config: &GitHubConfig, http: &HttpConfig, token: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: build_client(http, token)?,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            web_base_url: config.web_base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from(http),
        })
    }

    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base_url)
    }

    #[must_use]
    pub fn web_url(&self, path: &str) -> String {
        format!("{}{path}", self.web_base_url)
    }

    /// Make an API call and classify the result
    pub async fn api_call(&self, url: &str) -> ApiResult<reqwest::Response> {
        match resilient_get(&self.client, url, &self.retry).await {
            Ok(resp) => classify_response(resp, Utc::now() + chrono::Duration::hours(1)),
            Err(e) => ApiResult::Failed(e),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        match self.api_call(url).await {
            ApiResult::Success(resp) => match resp.json().await {
                Ok(value) => ApiResult::Success(value),
                Err(e) => ApiResult::Failed(e.into()),
            },
            ApiResult::RateLimited(info) => ApiResult::RateLimited(info),
            ApiResult::NotFound => ApiResult::NotFound,
            ApiResult::Failed(e) => ApiResult::Failed(e),
        }
    }

    /// Fetch one page of a listing, following GitHub's `Link` header convention.
    pub async fn get_page<T: DeserializeOwned>(&self, url: &str) -> ApiResult<Page<T>> {
        let resp = match self.api_call(url).await {
            ApiResult::Success(resp) => resp,
            ApiResult::RateLimited(info) => return ApiResult::RateLimited(info),
            ApiResult::NotFound => return ApiResult::NotFound,
            ApiResult::Failed(e) => return ApiResult::Failed(e),
        };

        // An empty repository answers the contributors listing with no body at all
        if resp.status() == StatusCode::NO_CONTENT {
            return ApiResult::Success(Page {
                items: Vec::new(),
                has_next: false,
            });
        }

        let has_next = resp
            .headers()
            .get(LINK)
            .and_then(|h| h.to_str().ok())
            .is_some_and(|link_str| link_str.contains(r#"rel="next""#));

        match resp.json::<Vec<T>>().await {
            Ok(items) => ApiResult::Success(Page { items, has_next }),
            Err(e) => ApiResult::Failed(e.into()),
        }
    }

    /// Fetch a page of the web surface as text.
    pub async fn get_text(&self, url: &str) -> ApiResult<String> {
        match self.api_call(url).await {
            ApiResult::Success(resp) => match resp.text().await {
                Ok(text) => ApiResult::Success(text),
                Err(e) => ApiResult::Failed(e.into()),
            },
            ApiResult::RateLimited(info) => ApiResult::RateLimited(info),
            ApiResult::NotFound => ApiResult::NotFound,
            ApiResult::Failed(e) => ApiResult::Failed(e),
        }
    }
}

/// Run one API call under the throttler, retrying on rate limits.
///
/// Acquires a throttler permit before each attempt. On a rate limit, pauses the throttler for
/// all concurrent tasks until the reset time (at most `max_wait`) and tries again.
pub async fn fetch_with_retry<T, F, Fut>(throttler: &Arc<Throttler>, max_wait: Duration, what: &str, mut call: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut attempt = 0;
    loop {
        let result = {
            let _permit = throttler.acquire().await;
            call().await
        };

        match result {
            ApiResult::RateLimited(info) if attempt < MAX_RATE_LIMIT_RETRIES => {
                attempt += 1;
                let wait = rate_limit_wait(info, Utc::now(), max_wait);
                if throttler.pause_for(wait) {
                    log::warn!(
                        target: LOG_TARGET,
                        "Hit GitHub rate limit while fetching {what}, waiting {}s",
                        wait.as_secs()
                    );
                }
            }
            other => return other,
        }
    }
}

/// How long to pause for a rate limit that resets at `info.reset_at`.
#[must_use]
pub fn rate_limit_wait(info: RateLimitInfo, now: DateTime<Utc>, max_wait: Duration) -> Duration {
    (info.reset_at - now).to_std().unwrap_or(Duration::ZERO).min(max_wait)
}
