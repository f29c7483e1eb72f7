use super::path_utils::encode_key_component;
use super::{Backend, Lookup, Table};
use crate::Result;
use core::sync::atomic::{AtomicU64, Ordering};
use ohno::{IntoAppError, bail};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const LOG_TARGET: &str = "     store";
const DOCUMENT_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A backend that keeps one JSON file per record under a root directory.
///
/// Layout is `<root>/<table>/<encoded key>.json`. Writes go to a temporary file in the same
/// directory which is then renamed over the target, so readers see either the old or the new
/// document. A missing root directory is reported as an unavailable store rather than as
/// empty tables.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Use an existing directory as the store root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the store root if needed, then use it.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).into_app_err_with(|| format!("creating store directory '{}'", root.display()))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_dir(&self, table: Table) -> PathBuf {
        self.root.join(<&'static str>::from(table))
    }

    fn document_path(&self, table: Table, key: &str) -> PathBuf {
        self.table_dir(table)
            .join(format!("{}.{DOCUMENT_EXTENSION}", encode_key_component(key)))
    }

    fn ensure_root(&self) -> Result<()> {
        if !self.root.is_dir() {
            bail!("store directory '{}' is not available", self.root.display());
        }

        Ok(())
    }
}

impl Backend for FileBackend {
    fn read(&self, table: Table, key: &str) -> Lookup<String> {
        if let Err(e) = self.ensure_root() {
            return Lookup::Unavailable(Arc::new(e));
        }

        let path = self.document_path(table, key);
        match fs::read_to_string(&path) {
            Ok(doc) => Lookup::Found(doc),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!(target: LOG_TARGET, "No document for '{key}' in {table}");
                Lookup::NotFound
            }
            Err(e) => Lookup::Unavailable(Arc::new(ohno::app_err!("reading '{}': {e}", path.display()))),
        }
    }

    fn write(&self, table: Table, key: &str, document: &str) -> Result<()> {
        self.ensure_root()?;

        let dir = self.table_dir(table);
        fs::create_dir_all(&dir).into_app_err_with(|| format!("creating directory '{}'", dir.display()))?;

        let path = self.document_path(table, key);
        let temp_path = dir.join(format!(
            ".{}.{}.{TEMP_EXTENSION}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let result = replace_file(&temp_path, &path, document);
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }

        result
    }

    fn delete(&self, table: Table, key: &str) -> Result<bool> {
        self.ensure_root()?;

        let path = self.document_path(table, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).into_app_err_with(|| format!("deleting '{}'", path.display())),
        }
    }

    fn scan(&self, table: Table) -> Result<Vec<String>> {
        self.ensure_root()?;

        let dir = self.table_dir(table);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).into_app_err_with(|| format!("listing '{}'", dir.display())),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.into_app_err_with(|| format!("listing '{}'", dir.display()))?.path();
            if path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION) {
                paths.push(path);
            }
        }

        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            match fs::read_to_string(&path) {
                Ok(doc) => documents.push(doc),

                // Deleted between listing and reading
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e).into_app_err_with(|| format!("reading '{}'", path.display())),
            }
        }

        Ok(documents)
    }
}

/// Write `document` to `temp_path`, then rename it over `path`.
fn replace_file(temp_path: &Path, path: &Path, document: &str) -> Result<()> {
    let mut file = fs::File::create(temp_path).into_app_err_with(|| format!("creating '{}'", temp_path.display()))?;
    file.write_all(document.as_bytes())
        .into_app_err_with(|| format!("writing '{}'", temp_path.display()))?;
    file.sync_all().into_app_err_with(|| format!("syncing '{}'", temp_path.display()))?;
    drop(file);
    fs::rename(temp_path, path).into_app_err_with(|| format!("replacing '{}'", path.display()))
}
