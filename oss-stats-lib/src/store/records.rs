use super::{Freshness, Table};
use crate::model::{FeedEntry, GitHubStats, NpmDownloadChunk, NpmLibraryStats, NpmOrgStats, StatsKey, StatsSource};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A record type the store knows how to place and age.
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: Table;

    /// The key this record is stored under.
    fn storage_key(&self) -> String;

    fn freshness(&self) -> Freshness;
}

impl Record for NpmDownloadChunk {
    const TABLE: Table = Table::Chunks;

    fn storage_key(&self) -> String {
        self.key().storage_key()
    }

    fn freshness(&self) -> Freshness {
        if self.is_immutable {
            Freshness::Immutable
        } else {
            Freshness::SameUtcDay(self.updated_at)
        }
    }
}

impl Record for NpmOrgStats {
    const TABLE: Table = Table::Stats;

    fn storage_key(&self) -> String {
        StatsKey::npm_org(&self.org_id).storage_key()
    }

    fn freshness(&self) -> Freshness {
        Freshness::Windowed(self.updated_at)
    }
}

impl Record for NpmLibraryStats {
    const TABLE: Table = Table::Stats;

    fn storage_key(&self) -> String {
        StatsKey::npm_library(&self.library_id).storage_key()
    }

    fn freshness(&self) -> Freshness {
        Freshness::Windowed(self.updated_at)
    }
}

impl Record for GitHubStats {
    const TABLE: Table = Table::Stats;

    fn storage_key(&self) -> String {
        StatsKey::new(StatsSource::GitHub, self.scope.clone()).storage_key()
    }

    fn freshness(&self) -> Freshness {
        Freshness::Windowed(self.updated_at)
    }
}

impl Record for FeedEntry {
    const TABLE: Table = Table::Feed;

    fn storage_key(&self) -> String {
        self.entry_id.clone()
    }

    fn freshness(&self) -> Freshness {
        Freshness::Always
    }
}
