//! Search results must survive a restart of the application.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use shelfscout::cache::ResultCache;
use shelfscout::holdings::HoldingsInference;
use shelfscout::llm::{GenerativeBackend, GroundedReply, InlinePayload, LlmError, LlmResult};
use shelfscout::model::{BookSummary, LocationHint};
use shelfscout::paths::ScoutPaths;
use shelfscout::pipeline::{PipelineController, PipelineState, SearchStart};
use shelfscout::search::{BookSearch, CatalogBackend, SearchResult};

struct CountingCatalog {
    calls: AtomicUsize,
}

impl CatalogBackend for CountingCatalog {
    fn query(&self, query: &str, _limit: usize) -> SearchResult<Vec<BookSummary>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![BookSummary {
            key: "/works/OL45804W".into(),
            title: format!("{query} (first edition)"),
            authors: Some(vec!["Ursula K. Le Guin".into()]),
            cover_id: Some(8_231_856),
            first_publish_year: Some(1969),
        }])
    }
}

struct Offline;

impl GenerativeBackend for Offline {
    fn generate_grounded(&self, _prompt: &str) -> LlmResult<GroundedReply> {
        Err(LlmError::RequestFailed {
            message: "offline".into(),
        })
    }

    fn generate_image(&self, _prompt: &str) -> LlmResult<Vec<InlinePayload>> {
        Err(LlmError::RequestFailed {
            message: "offline".into(),
        })
    }
}

fn controller(catalog: Arc<CountingCatalog>, cache: ResultCache) -> PipelineController {
    let generative: Arc<dyn GenerativeBackend> = Arc::new(Offline);
    PipelineController::new(
        BookSearch::new(catalog, cache),
        HoldingsInference::new(generative.clone()),
        shelfscout::shelf::ShelfVisualizer::new(generative),
        LocationHint::Named("New York, NY".into()),
    )
}

#[test]
fn cached_results_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = ScoutPaths {
        config_dir: dir.path().join("config"),
        cache_dir: dir.path().join("cache"),
    };
    let catalog = Arc::new(CountingCatalog {
        calls: AtomicUsize::new(0),
    });

    {
        let mut p = controller(catalog.clone(), ResultCache::open(&paths.cache_file()));
        p.search("The Left Hand of Darkness").unwrap();
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
    }
    assert!(paths.cache_file().exists());

    let mut p = controller(catalog.clone(), ResultCache::open(&paths.cache_file()));
    assert_eq!(
        p.submit_query("the left hand of darkness").unwrap(),
        SearchStart::Cached
    );
    assert_eq!(p.state(), PipelineState::BrowsingResults);
    assert_eq!(
        p.session().books[0].title,
        "The Left Hand of Darkness (first edition)"
    );
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn cleared_cache_goes_upstream_again() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("search-cache.json");
    let catalog = Arc::new(CountingCatalog {
        calls: AtomicUsize::new(0),
    });

    {
        let mut p = controller(catalog.clone(), ResultCache::open(&file));
        p.search("Earthsea").unwrap();
    }
    ResultCache::open(&file).clear().unwrap();

    let mut p = controller(catalog.clone(), ResultCache::open(&file));
    assert!(matches!(
        p.submit_query("earthsea").unwrap(),
        SearchStart::Pending(_)
    ));
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn corrupt_cache_file_starts_empty() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("search-cache.json");
    std::fs::write(&file, "{ not json").unwrap();

    let catalog = Arc::new(CountingCatalog {
        calls: AtomicUsize::new(0),
    });
    let mut p = controller(catalog.clone(), ResultCache::open(&file));
    assert_eq!(p.search("Earthsea").unwrap().len(), 1);
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);

    // The rewrite replaced the corrupt content.
    let reopened = ResultCache::open(&file);
    assert_eq!(reopened.keys(), vec!["earthsea".to_string()]);
}
