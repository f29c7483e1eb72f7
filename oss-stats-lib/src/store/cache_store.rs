use super::{Backend, FileBackend, Lookup, MemoryBackend, Record, StalenessPolicy};
use crate::Result;
use chrono::{DateTime, Utc};
use ohno::{EnrichableExt, IntoAppError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

const LOG_TARGET: &str = "     store";

/// A record read through the fallback accessor, tagged with whether it has expired.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback<T> {
    pub record: T,
    pub is_stale: bool,
}

/// Typed access to the store with staleness predicates.
///
/// Cloning is cheap; clones share the same backend.
#[derive(Debug, Clone)]
pub struct CacheStore {
    backend: Arc<dyn Backend>,
    policy: StalenessPolicy,
}

impl CacheStore {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, policy: StalenessPolicy) -> Self {
        Self { backend, policy }
    }

    /// A store backed by a fresh in-memory backend, with the default policy.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new(), StalenessPolicy::default())
    }

    /// A store backed by JSON files under `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>, policy: StalenessPolicy) -> Result<Self> {
        Ok(Self::new(Arc::new(FileBackend::create(dir)?), policy))
    }

    #[must_use]
    pub const fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    /// Read a record regardless of its freshness.
    ///
    /// A document that no longer deserializes is treated as absent.
    #[must_use]
    pub fn get<T: Record>(&self, key: &str) -> Lookup<T> {
        match self.backend.read(T::TABLE, key) {
            Lookup::Found(doc) => match serde_json::from_str(&doc) {
                Ok(record) => {
                    log::debug!(target: LOG_TARGET, "Cache hit for '{key}' in {}", T::TABLE);
                    Lookup::Found(record)
                }
                Err(e) => {
                    log::debug!(target: LOG_TARGET, "Ignoring unreadable record '{key}' in {}: {e:#}", T::TABLE);
                    Lookup::NotFound
                }
            },
            Lookup::NotFound => {
                log::debug!(target: LOG_TARGET, "Cache miss for '{key}' in {}", T::TABLE);
                Lookup::NotFound
            }
            Lookup::Unavailable(e) => {
                log::warn!(target: LOG_TARGET, "Store unavailable while reading '{key}': {e:#}");
                Lookup::Unavailable(e)
            }
        }
    }

    /// Read several records at once. Absent keys are missing from the map.
    ///
    /// If any read finds the store unavailable, the whole batch is unavailable.
    #[must_use]
    pub fn get_batch<T: Record>(&self, keys: &[String]) -> Lookup<HashMap<String, T>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            match self.get::<T>(key) {
                Lookup::Found(record) => {
                    let _ = found.insert(key.clone(), record);
                }
                Lookup::NotFound => {}
                Lookup::Unavailable(e) => return Lookup::Unavailable(e),
            }
        }

        Lookup::Found(found)
    }

    /// Write a complete replacement for a record.
    pub fn set<T: Record>(&self, record: &T) -> Result<()> {
        let key = record.storage_key();

        #[cfg(debug_assertions)]
        let document = serde_json::to_string_pretty(record);
        #[cfg(not(debug_assertions))]
        let document = serde_json::to_string(record);

        let document = document.into_app_err_with(|| format!("serializing record '{key}'"))?;
        self.backend
            .write(T::TABLE, &key, &document)
            .map_err(|e| e.enrich_with(|| format!("writing record '{key}' to {}", T::TABLE)))
    }

    #[must_use]
    pub fn is_fresh<T: Record>(&self, record: &T, now: DateTime<Utc>) -> bool {
        self.policy.is_fresh(record.freshness(), now)
    }

    /// Read a record only if it is still fresh; a stale record reads as absent.
    #[must_use]
    pub fn get_fresh<T: Record>(&self, key: &str, now: DateTime<Utc>) -> Lookup<T> {
        match self.get::<T>(key) {
            Lookup::Found(record) if self.is_fresh(&record, now) => Lookup::Found(record),
            Lookup::Found(_) => {
                log::debug!(target: LOG_TARGET, "Record '{key}' in {} has expired", T::TABLE);
                Lookup::NotFound
            }
            other => other,
        }
    }

    /// Read a record whether or not it has expired, reporting which.
    ///
    /// This is the stale-fallback accessor: a failed refresh leaves the previous row readable.
    #[must_use]
    pub fn get_expired_as_fallback<T: Record>(&self, key: &str, now: DateTime<Utc>) -> Lookup<Fallback<T>> {
        self.get::<T>(key).map(|record| Fallback {
            is_stale: !self.is_fresh(&record, now),
            record,
        })
    }

    /// Every readable record of a table, in key order.
    pub fn scan<T: Record>(&self) -> Result<Vec<T>> {
        let documents = self.backend.scan(T::TABLE)?;
        Ok(documents
            .iter()
            .filter_map(|doc| match serde_json::from_str(doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::debug!(target: LOG_TARGET, "Skipping unreadable record in {}: {e:#}", T::TABLE);
                    None
                }
            })
            .collect())
    }

    /// Remove a record. Returns whether it existed.
    pub fn delete<T: Record>(&self, key: &str) -> Result<bool> {
        self.backend.delete(T::TABLE, key)
    }
}
