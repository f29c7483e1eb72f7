use super::{Backend, Lookup, Table};
use crate::Result;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use ohno::bail;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// An in-process backend.
///
/// Useful for tests: it can be switched into an "unavailable" state to simulate a
/// backend outage, and it counts writes.
#[derive(Debug)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<Table, BTreeMap<String, String>>>,
    available: AtomicBool,
    writes: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            tables: RwLock::default(),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate the backend going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }
}

impl Backend for MemoryBackend {
    fn read(&self, table: Table, key: &str) -> Lookup<String> {
        if !self.is_available() {
            return Lookup::Unavailable(Arc::new(ohno::app_err!("in-memory store is offline")));
        }

        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(&table)
            .and_then(|rows| rows.get(key))
            .map_or(Lookup::NotFound, |doc| Lookup::Found(doc.clone()))
    }

    fn write(&self, table: Table, key: &str, document: &str) -> Result<()> {
        if !self.is_available() {
            bail!("in-memory store is offline");
        }

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let _ = tables.entry(table).or_default().insert(key.to_string(), document.to_string());
        let _ = self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn delete(&self, table: Table, key: &str) -> Result<bool> {
        if !self.is_available() {
            bail!("in-memory store is offline");
        }

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.get_mut(&table).and_then(|rows| rows.remove(key)).is_some())
    }

    fn scan(&self, table: Table) -> Result<Vec<String>> {
        if !self.is_available() {
            bail!("in-memory store is offline");
        }

        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.get(&table).map(|rows| rows.values().cloned().collect()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_delete() {
        let backend = MemoryBackend::default();
        backend.write(Table::Feed, "blog:a", "{}").unwrap();

        assert!(matches!(backend.read(Table::Feed, "blog:a"), Lookup::Found(doc) if doc == "{}"));
        assert!(matches!(backend.read(Table::Stats, "blog:a"), Lookup::NotFound));

        assert!(backend.delete(Table::Feed, "blog:a").unwrap());
        assert!(!backend.delete(Table::Feed, "blog:a").unwrap());
        assert_eq!(backend.write_count(), 1);
    }

    #[test]
    fn scan_is_in_key_order() {
        let backend = MemoryBackend::default();
        backend.write(Table::Feed, "b", "2").unwrap();
        backend.write(Table::Feed, "a", "1").unwrap();

        assert_eq!(backend.scan(Table::Feed).unwrap(), vec!["1".to_string(), "2".to_string()]);
        assert!(backend.scan(Table::Chunks).unwrap().is_empty());
    }

    #[test]
    fn offline_backend_reports_unavailable() {
        let backend = MemoryBackend::default();
        backend.write(Table::Stats, "k", "{}").unwrap();
        backend.set_available(false);

        assert!(backend.read(Table::Stats, "k").is_unavailable());
        let _ = backend.write(Table::Stats, "k", "{}").unwrap_err();
        let _ = backend.scan(Table::Stats).unwrap_err();

        backend.set_available(true);
        assert!(matches!(backend.read(Table::Stats, "k"), Lookup::Found(_)));
    }
}
