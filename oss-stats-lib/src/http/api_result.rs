use crate::error::{FailureKind, ItemError};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

/// Rate limit information from response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: usize,
    pub reset_at: DateTime<Utc>,
}

/// Result of an upstream API call
#[derive(Debug)]
pub enum ApiResult<T> {
    /// Request succeeded
    Success(T),

    /// Rate limited; retry after the reset time
    RateLimited(RateLimitInfo),

    /// The requested resource does not exist (404)
    NotFound,

    /// Request failed after retries
    Failed(ohno::AppError),
}

impl<T> ApiResult<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResult<U> {
        match self {
            Self::Success(value) => ApiResult::Success(f(value)),
            Self::RateLimited(info) => ApiResult::RateLimited(info),
            Self::NotFound => ApiResult::NotFound,
            Self::Failed(e) => ApiResult::Failed(e),
        }
    }

    /// Turn a non-success outcome into a per-item error, or return the value.
    pub fn into_item_result(self, item: &str) -> Result<T, ItemError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::RateLimited(info) => Err(ItemError::new(
                item,
                FailureKind::RateLimited,
                format!("rate limited until {}", info.reset_at.to_rfc3339()),
            )),
            Self::NotFound => Err(ItemError::new(item, FailureKind::UpstreamNotFound, "not found upstream")),
            Self::Failed(e) => Err(ItemError::from_app_err(item, FailureKind::UpstreamUnavailable, &e)),
        }
    }
}

/// Classify a response the retry layer gave up on or passed through.
///
/// `fallback_reset` is used as the reset time of a rate limit that carries no headers.
pub fn classify_response(resp: reqwest::Response, fallback_reset: DateTime<Utc>) -> ApiResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return ApiResult::Success(resp);
    }

    if matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS) {
        let info = extract_rate_limit_from_headers(resp.headers());
        if status == StatusCode::TOO_MANY_REQUESTS || info.is_some_and(|i| i.remaining == 0) {
            return ApiResult::RateLimited(info.unwrap_or(RateLimitInfo {
                remaining: 0,
                reset_at: fallback_reset,
            }));
        }
    }

    if status == StatusCode::NOT_FOUND {
        return ApiResult::NotFound;
    }

    match resp.error_for_status() {
        Ok(resp) => ApiResult::Success(resp),
        Err(e) => ApiResult::Failed(e.into()),
    }
}

/// Extract rate limit information from API response headers
pub fn extract_rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let remaining = headers.get("x-ratelimit-remaining")?.to_str().ok()?.parse::<usize>().ok()?;
    let reset_timestamp = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse::<i64>().ok()?;
    let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;

    Some(RateLimitInfo { remaining, reset_at })
}
