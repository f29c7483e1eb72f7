use crate::Result;
use std::sync::Arc;

/// The three logical tables of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Table {
    /// npm download chunks, keyed by package, range and bin size.
    Chunks,

    /// Aggregate stats, keyed by source and org or library id.
    Stats,

    /// Feed entries, keyed by entry id.
    Feed,
}

/// Result of reading a record.
#[derive(Debug, Clone)]
pub enum Lookup<T> {
    /// The record exists.
    Found(T),

    /// No record exists under the key.
    NotFound,

    /// The store could not be reached; whether the record exists is unknown.
    Unavailable(Arc<ohno::AppError>),
}

impl<T> Lookup<T> {
    /// The record, if one was found.
    #[must_use]
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound | Self::Unavailable(_) => None,
        }
    }

    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::NotFound => Lookup::NotFound,
            Self::Unavailable(e) => Lookup::Unavailable(e),
        }
    }

    /// Convert into a `Result`, turning an unavailable store into an error.
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            Self::Found(value) => Ok(Some(value)),
            Self::NotFound => Ok(None),
            Self::Unavailable(e) => Err(ohno::app_err!("cache store unavailable: {e:#}")),
        }
    }
}

/// Raw document storage underneath [`CacheStore`](super::CacheStore).
///
/// Backends store opaque JSON documents. A `write` must replace the whole document or leave
/// the previous one untouched.
pub trait Backend: Send + Sync + core::fmt::Debug {
    fn read(&self, table: Table, key: &str) -> Lookup<String>;

    fn write(&self, table: Table, key: &str, document: &str) -> Result<()>;

    /// Remove a document. Returns whether a document existed.
    fn delete(&self, table: Table, key: &str) -> Result<bool>;

    /// Every document in a table, in key order.
    fn scan(&self, table: Table) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names() {
        assert_eq!(Table::Chunks.to_string(), "chunks");
        assert_eq!(Table::Stats.to_string(), "stats");
        assert_eq!(Table::Feed.to_string(), "feed");
    }

    #[test]
    fn lookup_helpers() {
        assert_eq!(Lookup::Found(2).map(|v| v * 2).found(), Some(4));
        assert_eq!(Lookup::<u32>::NotFound.found(), None);

        let unavailable = Lookup::<u32>::Unavailable(Arc::new(ohno::app_err!("down")));
        assert!(unavailable.is_unavailable());
        let _ = unavailable.into_result().unwrap_err();
        assert_eq!(Lookup::<u32>::NotFound.into_result().unwrap(), None);
    }
}
