//! Pipeline controller: search → select → holdings → shelf view.
//!
//! The controller owns the [`SessionState`] and moves between
//! [`PipelineState`]s only through the operations below. Each network-bound
//! step is split in three so the blocking leg can run elsewhere:
//!
//! 1. a `&mut self` call that performs the transition and hands out a ticket
//!    tagged with the current epoch (`submit_query`, `select_book`);
//! 2. a `&self` call that does the network work (`run_search`,
//!    `run_holdings`);
//! 3. a `&mut self` call that applies the result, ignoring it when the ticket
//!    is stale (`complete_search`, `complete_holdings`).
//!
//! `search` and `open_book` chain the three for synchronous callers.
//! Nothing here retries on its own.

mod state;

pub use state::{DetailState, PipelineState, SessionState};

use std::sync::Arc;

use crate::cache::ResultCache;
use crate::config::ScoutConfig;
use crate::error::{ErrorKind, PipelineError};
use crate::holdings::{HoldingsError, HoldingsInference, HoldingsReport};
use crate::llm::{GeminiClient, GenerativeBackend};
use crate::model::{BookSummary, LocationHint, ShelfImage};
use crate::search::{BookSearch, CatalogBackend, OpenLibraryBackend, SearchError};
use crate::shelf::{ShelfOutcome, ShelfRequest, ShelfVisualizer};

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// A pending catalog search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    epoch: u64,
    query: String,
}

impl SearchTicket {
    pub fn query(&self) -> &str {
        &self.query
    }
}

/// How a submitted query started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStart {
    /// Served from the cache; the results are already in the session.
    Cached,
    /// Needs a network call.
    Pending(SearchTicket),
}

/// A pending holdings fetch for one selection.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingsTicket {
    epoch: u64,
    book: BookSummary,
    location: LocationHint,
}

impl HoldingsTicket {
    pub fn book(&self) -> &BookSummary {
        &self.book
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Drives the search-and-enrichment pipeline.
pub struct PipelineController {
    search: BookSearch,
    inference: HoldingsInference,
    visualizer: Arc<ShelfVisualizer>,
    state: PipelineState,
    session: SessionState,
    search_epoch: u64,
    location: Option<LocationHint>,
    fallback_location: LocationHint,
}

impl PipelineController {
    pub fn new(
        search: BookSearch,
        inference: HoldingsInference,
        visualizer: ShelfVisualizer,
        fallback_location: LocationHint,
    ) -> Self {
        Self {
            search,
            inference,
            visualizer: Arc::new(visualizer),
            state: PipelineState::Idle,
            session: SessionState::default(),
            search_epoch: 0,
            location: None,
            fallback_location,
        }
    }

    /// Wire up the HTTP backends described by `config`.
    pub fn from_config(config: &ScoutConfig, cache: ResultCache) -> Self {
        let catalog: Arc<dyn CatalogBackend> = Arc::new(OpenLibraryBackend::new(config.catalog()));
        let generative: Arc<dyn GenerativeBackend> =
            Arc::new(GeminiClient::new(config.generative()));

        Self::new(
            BookSearch::new(catalog, cache).with_limit(config.search_limit),
            HoldingsInference::new(generative.clone()).with_max_holdings(config.max_holdings),
            ShelfVisualizer::new(generative),
            config.fallback_location(),
        )
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn condition(&self) -> Option<ErrorKind> {
        self.session.condition
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    /// The book search, including its cache.
    pub fn book_search(&self) -> &BookSearch {
        &self.search
    }

    /// Memoized shelf image for a holding of the current selection.
    pub fn shelf_image(&self, holding_index: usize) -> Option<ShelfImage> {
        self.visualizer.cached(holding_index)
    }

    // -----------------------------------------------------------------------
    // External signals
    // -----------------------------------------------------------------------

    /// Record a geolocation fix.
    pub fn set_location(&mut self, location: LocationHint) {
        self.location = Some(location);
    }

    /// Forget the geolocation fix (denied or lost).
    pub fn clear_location(&mut self) {
        self.location = None;
    }

    /// The location used for holdings requests.
    pub fn location(&self) -> &LocationHint {
        self.location.as_ref().unwrap_or(&self.fallback_location)
    }

    /// A finished voice transcript is handled exactly like a typed query.
    pub fn submit_transcript(&mut self, transcript: &str) -> PipelineResult<SearchStart> {
        self.submit_query(transcript)
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Start a search. A cache hit goes straight to `BrowsingResults`
    /// without entering `Searching`.
    pub fn submit_query(&mut self, query: &str) -> PipelineResult<SearchStart> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        if matches!(self.state, PipelineState::ViewingDetail(_)) {
            self.leave_detail();
        }
        self.search_epoch += 1;

        if let Some(books) = self.search.cached(query) {
            tracing::debug!(query, count = books.len(), "query served from cache");
            self.apply_books(query, books);
            return Ok(SearchStart::Cached);
        }

        self.state = PipelineState::Searching;
        Ok(SearchStart::Pending(SearchTicket {
            epoch: self.search_epoch,
            query: query.to_string(),
        }))
    }

    /// Network leg of a search. Writes the cache on success.
    pub fn run_search(&self, ticket: &SearchTicket) -> Result<Vec<BookSummary>, SearchError> {
        self.search.fetch(&ticket.query)
    }

    /// Apply a search result. Returns `false` if a newer search superseded it.
    pub fn complete_search(
        &mut self,
        ticket: SearchTicket,
        result: Result<Vec<BookSummary>, SearchError>,
    ) -> bool {
        if ticket.epoch != self.search_epoch || self.state != PipelineState::Searching {
            tracing::debug!(query = %ticket.query, "dropping stale search result");
            return false;
        }

        match result {
            Ok(books) => self.apply_books(&ticket.query, books),
            Err(e) => {
                tracing::warn!(query = %ticket.query, error = %e, "search failed");
                // The previous list stays on screen, if there was one.
                self.state = if self.session.query.is_some() {
                    PipelineState::BrowsingResults
                } else {
                    PipelineState::Idle
                };
                self.session.condition = Some(ErrorKind::UpstreamUnavailable);
            }
        }
        true
    }

    /// Submit, run and complete a search in one go.
    pub fn search(&mut self, query: &str) -> PipelineResult<&[BookSummary]> {
        if let SearchStart::Pending(ticket) = self.submit_query(query)? {
            let result = self.run_search(&ticket);
            let failure = result.as_ref().err().map(PipelineError::from_search);
            self.complete_search(ticket, result);
            if let Some(e) = failure {
                return Err(e);
            }
        }
        Ok(&self.session.books)
    }

    fn apply_books(&mut self, query: &str, books: Vec<BookSummary>) {
        self.session.condition = books.is_empty().then_some(ErrorKind::NoMatches);
        self.session.query = Some(query.to_string());
        self.session.books = books;
        self.state = PipelineState::BrowsingResults;
    }

    // -----------------------------------------------------------------------
    // Selection and holdings
    // -----------------------------------------------------------------------

    /// Select a candidate. Clears holdings, citations and shelf images of
    /// the previous selection before anything else happens.
    pub fn select_book(&mut self, index: usize) -> PipelineResult<HoldingsTicket> {
        if !matches!(
            self.state,
            PipelineState::BrowsingResults | PipelineState::ViewingDetail(_)
        ) {
            return Err(PipelineError::InvalidSelection {
                index,
                available: 0,
            });
        }
        let book = self
            .session
            .books
            .get(index)
            .cloned()
            .ok_or(PipelineError::InvalidSelection {
                index,
                available: self.session.books.len(),
            })?;

        let epoch = self.visualizer.reset();
        self.session.clear_enrichment();
        self.session.condition = None;
        self.session.selection = Some(book.clone());
        self.state = PipelineState::ViewingDetail(DetailState::FetchingHoldings);
        tracing::debug!(book = %book.key, epoch, "book selected");

        Ok(HoldingsTicket {
            epoch,
            book,
            location: self.location().clone(),
        })
    }

    /// Network leg of a holdings fetch.
    pub fn run_holdings(&self, ticket: &HoldingsTicket) -> Result<HoldingsReport, HoldingsError> {
        self.inference.fetch_holdings(&ticket.book, &ticket.location)
    }

    /// Apply a holdings result. Returns `false` when the ticket belongs to a
    /// selection that is no longer current; its result is discarded.
    pub fn complete_holdings(
        &mut self,
        ticket: HoldingsTicket,
        result: Result<HoldingsReport, HoldingsError>,
    ) -> bool {
        if ticket.epoch != self.visualizer.epoch()
            || self.state != PipelineState::ViewingDetail(DetailState::FetchingHoldings)
        {
            tracing::debug!(book = %ticket.book.key, "dropping late holdings for stale selection");
            return false;
        }

        let detail = match result {
            Ok(report) if report.holdings.is_empty() => {
                self.session.citations = report.citations;
                DetailState::HoldingsEmpty
            }
            Ok(report) => {
                self.session.holdings = report.holdings;
                self.session.citations = report.citations;
                DetailState::HoldingsReady
            }
            Err(e) => {
                let kind = match e {
                    HoldingsError::InferenceUnavailable { .. } => ErrorKind::InferenceUnavailable,
                    HoldingsError::Malformed(_) => ErrorKind::MalformedHoldingsData,
                };
                self.session.condition = Some(kind);
                DetailState::HoldingsError(kind)
            }
        };
        self.state = PipelineState::ViewingDetail(detail);
        true
    }

    /// Select, fetch and complete in one go.
    pub fn open_book(&mut self, index: usize) -> PipelineResult<DetailState> {
        let ticket = self.select_book(index)?;
        let result = self.run_holdings(&ticket);
        let failure = result.as_ref().err().map(PipelineError::from_holdings);
        self.complete_holdings(ticket, result);
        if let Some(e) = failure {
            return Err(e);
        }
        match self.state {
            PipelineState::ViewingDetail(detail) => Ok(detail),
            _ => Ok(DetailState::FetchingHoldings),
        }
    }

    /// Return to the result list, which is left as it was.
    pub fn back(&mut self) {
        if matches!(self.state, PipelineState::ViewingDetail(_)) {
            self.leave_detail();
            self.state = PipelineState::BrowsingResults;
        }
    }

    fn leave_detail(&mut self) {
        self.session.selection = None;
        self.session.clear_enrichment();
        self.session.condition = None;
        self.visualizer.reset();
    }

    // -----------------------------------------------------------------------
    // Shelf view
    // -----------------------------------------------------------------------

    /// Build the shelf request for a holding of the current selection.
    pub fn shelf_request(&self, holding_index: usize) -> PipelineResult<ShelfRequest> {
        if self.state != PipelineState::ViewingDetail(DetailState::HoldingsReady) {
            return Err(PipelineError::HoldingsNotReady);
        }
        let holding =
            self.session
                .holdings
                .get(holding_index)
                .ok_or(PipelineError::InvalidSelection {
                    index: holding_index,
                    available: self.session.holdings.len(),
                })?;
        Ok(ShelfRequest {
            epoch: self.visualizer.epoch(),
            index: holding_index,
            library: holding.library.clone(),
            call_number: holding.call_number.clone(),
        })
    }

    /// Shared handle to the visualizer, for running shelf requests off the
    /// controller's thread.
    pub fn visualizer(&self) -> Arc<ShelfVisualizer> {
        Arc::clone(&self.visualizer)
    }

    /// Request the shelf view for a holding. A failure sets no condition:
    /// the view is optional and the action stays available.
    pub fn request_shelf_view(&self, holding_index: usize) -> PipelineResult<ShelfOutcome> {
        let request = self.shelf_request(holding_index)?;
        Ok(self.visualizer.generate(&request)?)
    }
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("state", &self.state)
            .field("books", &self.session.books.len())
            .field("holdings", &self.session.holdings.len())
            .field("location", self.location())
            .finish()
    }
}
