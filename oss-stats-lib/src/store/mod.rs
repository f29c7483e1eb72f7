//! The persistent cache store.
//!
//! The store is the sole owner of every persisted record. It is constructed once and handed
//! to each refresher, synchronizer and query by clone; clones share the same backend.
//!
//! Records live in three logical tables (see [`Table`]). Each record is written as one
//! complete JSON document, so a failed write never leaves a half-updated row behind.
//! Reading distinguishes "not found" from "store unavailable" through [`Lookup`].

mod backend;
mod cache_store;
mod file_backend;
mod memory_backend;
mod path_utils;
mod records;
mod staleness;

pub use backend::{Backend, Lookup, Table};
pub use cache_store::{CacheStore, Fallback};
pub use file_backend::FileBackend;
pub use memory_backend::MemoryBackend;
pub use records::Record;
pub use staleness::{DEFAULT_STATS_WINDOW, Freshness, StalenessPolicy};
