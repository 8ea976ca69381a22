//! Durable search-result cache backed by a single JSON file.
//!
//! The file holds one mapping from normalized query to the book list that
//! query returned. It lives at `~/.cache/shelfscout/search-cache.json`.
//! A missing or corrupt file is treated as an empty cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use miette::Diagnostic;
use thiserror::Error;

use crate::model::BookSummary;

/// Errors from writing the cache. Reads never fail.
#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    #[diagnostic(
        code(scout::cache::io),
        help(
            "Failed to write the search cache. Check that the cache directory exists \
             and has correct permissions, or pass --cache-dir."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize the search cache: {message}")]
    #[diagnostic(code(scout::cache::serialize))]
    Serialize { message: String },
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

type Entries = BTreeMap<String, Vec<BookSummary>>;

/// Case-fold a query into its cache key.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Normalized query → prior result set.
pub struct ResultCache {
    path: Option<PathBuf>,
    entries: Mutex<Entries>,
}

impl ResultCache {
    /// Open the cache file at `path`, starting empty if it is missing or
    /// cannot be decoded.
    pub fn open(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<Entries>(&data) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "search cache unreadable, starting empty");
                    Entries::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Entries::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "search cache unreadable, starting empty");
                Entries::new()
            }
        };

        Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
        }
    }

    /// A cache that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Entries::new()),
        }
    }

    /// Look up a query.
    pub fn lookup(&self, query: &str) -> Option<Vec<BookSummary>> {
        let key = normalize_query(query);
        self.lock().get(&key).cloned()
    }

    /// Store the results for a query, overwriting any previous entry, and
    /// flush the whole mapping to disk.
    pub fn store(&self, query: &str, results: &[BookSummary]) -> CacheResult<()> {
        let key = normalize_query(query);
        let mut entries = self.lock();
        entries.insert(key, results.to_vec());
        self.flush(&entries)
    }

    /// Drop every entry.
    pub fn clear(&self) -> CacheResult<()> {
        let mut entries = self.lock();
        entries.clear();
        self.flush(&entries)
    }

    /// Cached keys, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Backing file, if durable.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write to a sibling temp file and rename over the real one, so readers
    /// only ever see a complete mapping.
    fn flush(&self, entries: &Entries) -> CacheResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let json = serde_json::to_string(entries).map_err(|e| CacheError::Serialize {
            message: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| CacheError::Io {
            path: tmp.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp, path).map_err(|e| CacheError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(key: &str, title: &str) -> BookSummary {
        BookSummary {
            key: key.into(),
            title: title.into(),
            authors: None,
            cover_id: None,
            first_publish_year: None,
        }
    }

    #[test]
    fn normalize_folds_case_and_trims() {
        assert_eq!(normalize_query("  Dune "), "dune");
        assert_eq!(normalize_query("The HOBBIT"), "the hobbit");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let cache = ResultCache::in_memory();
        cache.store("Dune", &[book("/works/1", "Dune")]).unwrap();
        assert_eq!(cache.lookup("dune").unwrap().len(), 1);
        assert_eq!(cache.lookup("DUNE").unwrap()[0].title, "Dune");
        assert!(cache.lookup("dune messiah").is_none());
    }

    #[test]
    fn store_overwrites_entry() {
        let cache = ResultCache::in_memory();
        cache.store("emma", &[book("/works/1", "Emma")]).unwrap();
        cache
            .store("Emma", &[book("/works/2", "Emma"), book("/works/3", "Emma 2")])
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("emma").unwrap().len(), 2);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("search-cache.json");
        {
            let cache = ResultCache::open(&path);
            assert!(cache.is_empty());
            cache.store("Dune", &[book("/works/1", "Dune")]).unwrap();
        }
        let cache = ResultCache::open(&path);
        assert_eq!(cache.keys(), vec!["dune".to_string()]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_empty_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("search-cache.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache = ResultCache::open(&path);
        assert!(cache.is_empty());

        // The next write replaces the corrupt file.
        cache.store("emma", &[book("/works/1", "Emma")]).unwrap();
        assert_eq!(ResultCache::open(&path).len(), 1);
    }

    #[test]
    fn clear_empties_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("search-cache.json");
        let cache = ResultCache::open(&path);
        cache.store("emma", &[book("/works/1", "Emma")]).unwrap();
        cache.clear().unwrap();
        assert!(ResultCache::open(&path).is_empty());
    }
}
