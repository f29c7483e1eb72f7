//! GET requests with retry, exponential backoff and an overall timeout.
//!
//! Network errors, 5xx and 429 responses are retried. A 403 is retried only when the
//! upstream tells us how long to wait (GitHub's secondary rate limit). Everything else is
//! returned to the caller as-is on the first attempt, so a 404 is never retried.

use crate::Result;
use crate::config::HttpConfig;
use core::time::Duration;
use ohno::IntoAppError;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Delay used for a 429 that carries no `Retry-After`.
const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(5);

/// Largest exponent applied to the base delay.
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// How hard to try before giving up on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries on top of the original attempt.
    pub max_retries: u32,

    /// Delay before the first retry; doubled for each subsequent one.
    pub base_delay: Duration,

    /// Bound on the whole call, retries included.
    pub timeout: Duration,
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
            timeout: config.request_timeout,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (zero based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1 << attempt.min(MAX_BACKOFF_EXPONENT))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Recovery {
    Never,

    /// Retry, after the given delay or the policy's backoff.
    Retry(Option<Duration>),
}

/// Parse the `Retry-After` header value as seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let s = headers.get(RETRY_AFTER).and_then(|h| h.to_str().ok())?;
    s.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn classify_status(status: StatusCode, headers: &HeaderMap) -> Recovery {
    if status.is_server_error() {
        return Recovery::Retry(None);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => Recovery::Retry(Some(parse_retry_after(headers).unwrap_or(DEFAULT_RATE_LIMIT_DELAY))),
        StatusCode::FORBIDDEN => parse_retry_after(headers).map_or(Recovery::Never, |delay| Recovery::Retry(Some(delay))),
        _ => Recovery::Never,
    }
}

fn classify(result: &Result<reqwest::Response>) -> Recovery {
    match result {
        Err(_) => Recovery::Retry(None),
        Ok(resp) => classify_status(resp.status(), resp.headers()),
    }
}

/// Send an HTTP GET request with automatic retry and timeout.
///
/// The final response is returned whatever its status once retries are exhausted, so callers
/// classify it themselves.
pub async fn resilient_get(client: &reqwest::Client, url: &str, policy: &RetryPolicy) -> Result<reqwest::Response> {
    tokio::time::timeout(policy.timeout, get_with_retries(client, url, policy))
        .await
        .into_app_err_with(|| format!("HTTP request to '{url}' timed out after {}s", policy.timeout.as_secs_f64()))?
}

async fn get_with_retries(client: &reqwest::Client, url: &str, policy: &RetryPolicy) -> Result<reqwest::Response> {
    let mut attempt = 0;
    loop {
        let result = client.get(url).send().await.map_err(ohno::AppError::from);

        match classify(&result) {
            Recovery::Retry(delay) if attempt < policy.max_retries => {
                let delay = delay.unwrap_or_else(|| policy.backoff(attempt));
                log::debug!(
                    "retrying HTTP GET {url} (attempt {}, delay {}ms)",
                    attempt + 1,
                    delay.as_millis(),
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Recovery::Retry(_) | Recovery::Never => return result,
        }
    }
}
