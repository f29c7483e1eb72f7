use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Granularity of the points held in a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BinSize {
    #[default]
    Day,
}

/// Downloads recorded for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadPoint {
    pub day: NaiveDate,
    pub downloads: u64,
}

/// Identifies a cached range of download counts for one package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub package: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub bin_size: BinSize,
}

impl ChunkKey {
    #[must_use]
    pub fn new(package: impl Into<String>, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            package: package.into(),
            from,
            to,
            bin_size: BinSize::Day,
        }
    }

    /// The composite key under which the chunk is stored.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}|{}|{}|{}", self.package, self.from, self.to, self.bin_size)
    }

    /// A range that ends before `today` can never change again.
    #[must_use]
    pub fn is_entirely_before(&self, today: NaiveDate) -> bool {
        self.to < today
    }

    /// Last day to request upstream. Days after `today` have no data yet.
    #[must_use]
    pub fn fetch_end(&self, today: NaiveDate) -> NaiveDate {
        self.to.min(today).max(self.from)
    }
}

impl core::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} [{}..={}]", self.package, self.from, self.to)
    }
}

/// A contiguous range of daily download counts for one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpmDownloadChunk {
    pub package_name: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub bin_size: BinSize,
    pub points: Vec<DownloadPoint>,
    pub total_downloads: u64,
    pub is_immutable: bool,
    pub updated_at: DateTime<Utc>,
}

impl NpmDownloadChunk {
    /// Build a chunk from the points returned upstream.
    ///
    /// Points are sorted by day and points outside the key's range are dropped. The chunk is
    /// immutable when its whole range lies before the UTC day of `now`.
    #[must_use]
    pub fn new(key: &ChunkKey, mut points: Vec<DownloadPoint>, now: DateTime<Utc>) -> Self {
        points.retain(|p| p.day >= key.from && p.day <= key.to);
        points.sort_by_key(|p| p.day);

        let total_downloads = points.iter().map(|p| p.downloads).sum();

        Self {
            package_name: key.package.clone(),
            date_from: key.from,
            date_to: key.to,
            bin_size: key.bin_size,
            points,
            total_downloads,
            is_immutable: key.is_entirely_before(now.date_naive()),
            updated_at: now,
        }
    }

    #[must_use]
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            package: self.package_name.clone(),
            from: self.date_from,
            to: self.date_to,
            bin_size: self.bin_size,
        }
    }
}
