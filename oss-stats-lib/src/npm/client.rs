//! npm downloads API client

use crate::Result;
use crate::config::{HttpConfig, NpmConfig};
use crate::http::{ApiResult, RetryPolicy, build_client, classify_response, resilient_get};
use crate::model::{ChunkKey, DownloadPoint};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

const LOG_TARGET: &str = "       npm";

/// Body of `GET /downloads/range/{from}:{to}/{package}`
#[derive(Debug, Deserialize)]
pub struct RangeResponse {
    #[serde(default)]
    pub downloads: Vec<RangePoint>,
}

#[derive(Debug, Deserialize)]
pub struct RangePoint {
    pub day: NaiveDate,
    pub downloads: u64,
}

#[derive(Debug, Clone)]
pub struct NpmClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl NpmClient {
    pub fn new(npm: &NpmConfig, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(http, None)?,
            base_url: npm.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from(http),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn range_url(&self, key: &ChunkKey, end: NaiveDate) -> String {
        format!("{}/downloads/range/{}:{end}/{}", self.base_url, key.from, key.package)
    }

    /// Fetch the daily download counts covered by `key`, up to the UTC day of `now`.
    pub async fn fetch_range(&self, key: &ChunkKey, now: DateTime<Utc>) -> ApiResult<Vec<DownloadPoint>> {
        let end = key.fetch_end(now.date_naive());
        let url = self.range_url(key, end);
        log::info!(target: LOG_TARGET, "Querying npm for downloads of '{}' from {} to {end}", key.package, key.from);

        let resp = match resilient_get(&self.client, &url, &self.retry).await {
            Ok(resp) => resp,
            Err(e) => return ApiResult::Failed(e),
        };

        let resp = match classify_response(resp, now + chrono::Duration::minutes(1)) {
            ApiResult::Success(resp) => resp,
            ApiResult::RateLimited(info) => return ApiResult::RateLimited(info),
            ApiResult::NotFound => return ApiResult::NotFound,
            ApiResult::Failed(e) => return ApiResult::Failed(e),
        };

        match resp.json::<RangeResponse>().await {
            Ok(body) => ApiResult::Success(
                body.downloads
                    .into_iter()
                    .map(|p| DownloadPoint {
                        day: p.day,
                        downloads: p.downloads,
                    })
                    .collect(),
            ),
            Err(e) => ApiResult::Failed(e.into()),
        }
    }
}
