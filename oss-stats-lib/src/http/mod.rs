//! Outbound HTTP plumbing shared by the refreshers and synchronizers.

mod api_result;
mod resilient_http;
mod throttler;

pub use api_result::{ApiResult, RateLimitInfo, classify_response, extract_rate_limit_from_headers};
pub use resilient_http::{RetryPolicy, resilient_get};
pub use throttler::Throttler;

use crate::Result;
use crate::config::HttpConfig;
use ohno::IntoAppError;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

/// User agent sent with every upstream request.
pub const USER_AGENT: &str = concat!("oss-stats/", env!("CARGO_PKG_VERSION"));

/// Build an HTTP client with the crate user agent, a per-request timeout and an optional
/// bearer token.
pub fn build_client(config: &HttpConfig, bearer_token: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout);

    if let Some(token) = bearer_token {
        let mut auth_val = HeaderValue::from_str(&format!("Bearer {token}")).into_app_err("invalid characters in API token")?;
        auth_val.set_sensitive(true);

        let mut headers = HeaderMap::new();
        let _ = headers.insert(AUTHORIZATION, auth_val);
        builder = builder.default_headers(headers);
    }

    builder.build().into_app_err("unable to create HTTP client")
}
