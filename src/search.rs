//! Bibliographic search against a keyless catalog service.
//!
//! [`BookSearch`] puts the durable [`ResultCache`] in front of a
//! [`CatalogBackend`]: a cache hit never touches the network, and every
//! successful upstream fetch is written back before it is returned.

use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::cache::ResultCache;
use crate::model::BookSummary;

/// Maximum number of candidates returned by a search.
pub const MAX_RESULTS: usize = 12;

/// Fields requested from the catalog.
const FIELD_PROJECTION: &str = "key,title,author_name,cover_i,first_publish_year";

/// Errors from the catalog search.
#[derive(Debug, Error, Diagnostic)]
pub enum SearchError {
    #[error("catalog search failed: {message}")]
    #[diagnostic(
        code(scout::search::unavailable),
        help("Could not reach the book catalog. Check your connection and try again.")
    )]
    Unavailable { message: String },

    #[error("catalog returned an unreadable response: {message}")]
    #[diagnostic(
        code(scout::search::invalid_response),
        help("The catalog answered but not in the expected format. Try again later.")
    )]
    InvalidResponse { message: String },
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// A source of candidate books for a free-text query.
pub trait CatalogBackend: Send + Sync {
    /// Return at most `limit` candidates in upstream relevance order.
    fn query(&self, query: &str, limit: usize) -> SearchResult<Vec<BookSummary>>;
}

/// Connection settings for the Open Library search API.
#[derive(Debug, Clone)]
pub struct OpenLibraryConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for OpenLibraryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openlibrary.org".into(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Wire shape of `search.json`.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<serde_json::Value>,
}

/// Open Library search over HTTP.
pub struct OpenLibraryBackend {
    config: OpenLibraryConfig,
    agent: ureq::Agent,
}

impl OpenLibraryBackend {
    pub fn new(config: OpenLibraryConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }
}

impl CatalogBackend for OpenLibraryBackend {
    fn query(&self, query: &str, limit: usize) -> SearchResult<Vec<BookSummary>> {
        let url = format!("{}/search.json", self.config.base_url);
        tracing::debug!(%url, query, limit, "catalog search");

        let resp = self
            .agent
            .get(&url)
            .query("q", query)
            .query("fields", FIELD_PROJECTION)
            .query("limit", &limit.to_string())
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => SearchError::Unavailable {
                    message: format!("HTTP status {code}"),
                },
                ureq::Error::Transport(transport) => SearchError::Unavailable {
                    message: transport.to_string(),
                },
            })?;

        let body = resp.into_string().map_err(|e| SearchError::Unavailable {
            message: format!("failed to read body: {e}"),
        })?;
        parse_search_response(&body, limit)
    }
}

/// Decode a `search.json` body. Documents without a key or title are skipped.
fn parse_search_response(body: &str, limit: usize) -> SearchResult<Vec<BookSummary>> {
    let parsed: SearchResponse =
        serde_json::from_str(body).map_err(|e| SearchError::InvalidResponse {
            message: e.to_string(),
        })?;

    Ok(parsed
        .docs
        .into_iter()
        .filter_map(|doc| serde_json::from_value::<BookSummary>(doc).ok())
        .take(limit)
        .collect())
}

/// Outcome of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub books: Vec<BookSummary>,
    /// Served from the result cache without a network call.
    pub from_cache: bool,
}

/// Cache-through book search.
pub struct BookSearch {
    backend: Arc<dyn CatalogBackend>,
    cache: ResultCache,
    limit: usize,
}

impl BookSearch {
    pub fn new(backend: Arc<dyn CatalogBackend>, cache: ResultCache) -> Self {
        Self {
            backend,
            cache,
            limit: MAX_RESULTS,
        }
    }

    /// Override the candidate cap (never above [`MAX_RESULTS`]).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_RESULTS);
        self
    }

    /// Cached results for a query, if any.
    pub fn cached(&self, query: &str) -> Option<Vec<BookSummary>> {
        self.cache.lookup(query)
    }

    /// Query upstream and write the results into the cache.
    ///
    /// A cache write failure is logged; the fetched results are still returned.
    pub fn fetch(&self, query: &str) -> SearchResult<Vec<BookSummary>> {
        let mut books = self.backend.query(query.trim(), self.limit)?;
        books.truncate(self.limit);
        tracing::info!(query, count = books.len(), "catalog search complete");

        if let Err(e) = self.cache.store(query, &books) {
            tracing::warn!(error = %e, "failed to write search cache");
        }
        Ok(books)
    }

    /// Cache first, upstream on a miss.
    pub fn search(&self, query: &str) -> SearchResult<SearchOutcome> {
        if let Some(books) = self.cached(query) {
            tracing::debug!(query, count = books.len(), "search cache hit");
            return Ok(SearchOutcome {
                books,
                from_cache: true,
            });
        }
        let books = self.fetch(query)?;
        Ok(SearchOutcome {
            books,
            from_cache: false,
        })
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }
}

impl std::fmt::Debug for BookSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookSearch")
            .field("cache", &self.cache)
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: Arc<AtomicUsize>,
        count: usize,
    }

    impl CatalogBackend for CountingBackend {
        fn query(&self, query: &str, _limit: usize) -> SearchResult<Vec<BookSummary>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.count)
                .map(|i| BookSummary {
                    key: format!("/works/OL{i}W"),
                    title: format!("{query} {i}"),
                    authors: None,
                    cover_id: None,
                    first_publish_year: None,
                })
                .collect())
        }
    }

    fn counting(count: usize) -> (BookSearch, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            calls: calls.clone(),
            count,
        };
        (
            BookSearch::new(Arc::new(backend), ResultCache::in_memory()),
            calls,
        )
    }

    #[test]
    fn repeated_query_hits_upstream_once() {
        let (search, calls) = counting(2);
        let first = search.search("Dune").unwrap();
        let second = search.search("Dune").unwrap();
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.books, second.books);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn case_variants_share_a_cache_entry() {
        let (search, calls) = counting(1);
        search.search("Dune").unwrap();
        assert!(search.search("dune").unwrap().from_cache);
        assert!(search.search(" DUNE ").unwrap().from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn results_are_capped() {
        let (search, _) = counting(30);
        assert_eq!(search.search("history").unwrap().books.len(), MAX_RESULTS);

        let (search, _) = counting(30);
        let search = search.with_limit(5);
        assert_eq!(search.search("history").unwrap().books.len(), 5);
    }

    #[test]
    fn empty_result_is_success_and_cached() {
        let (search, calls) = counting(0);
        let outcome = search.search("zzzz").unwrap();
        assert!(outcome.books.is_empty());
        assert!(search.search("zzzz").unwrap().from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parse_skips_incomplete_docs() {
        let body = r#"{"numFound":3,"docs":[
            {"key":"/works/OL1W","title":"Dune","author_name":["Frank Herbert"],"cover_i":1,"first_publish_year":1965},
            {"title":"No key"},
            {"key":"/works/OL2W","title":"Dune Messiah"}
        ]}"#;
        let books = parse_search_response(body, MAX_RESULTS).unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].title, "Dune");
        assert_eq!(books[1].key, "/works/OL2W");
    }

    #[test]
    fn parse_zero_docs() {
        let books = parse_search_response(r#"{"numFound":0,"docs":[]}"#, MAX_RESULTS).unwrap();
        assert!(books.is_empty());
    }

    #[test]
    fn parse_garbage_is_invalid_response() {
        let err = parse_search_response("<html>", MAX_RESULTS).unwrap_err();
        assert!(matches!(err, SearchError::InvalidResponse { .. }));
    }

    #[test]
    fn unreachable_catalog_is_unavailable() {
        let backend = OpenLibraryBackend::new(OpenLibraryConfig {
            base_url: "http://127.0.0.1:1".into(), // unreachable port
            timeout: Duration::from_secs(2),
        });
        let err = backend.query("dune", MAX_RESULTS).unwrap_err();
        assert!(matches!(err, SearchError::Unavailable { .. }));
    }
}
