//! Pipeline states and the session data they drive.

use crate::error::ErrorKind;
use crate::model::{BookSummary, Citation, HoldingRecord};

/// Sub-state of the detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailState {
    FetchingHoldings,
    HoldingsReady,
    /// The inference succeeded with zero holdings.
    HoldingsEmpty,
    /// `InferenceUnavailable` or `MalformedHoldingsData`.
    HoldingsError(ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Searching,
    BrowsingResults,
    ViewingDetail(DetailState),
}

impl PipelineState {
    /// Whether a network-bound step is pending.
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            Self::Searching | Self::ViewingDetail(DetailState::FetchingHoldings)
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Searching => f.write_str("searching"),
            Self::BrowsingResults => f.write_str("browsing results"),
            Self::ViewingDetail(DetailState::FetchingHoldings) => f.write_str("fetching holdings"),
            Self::ViewingDetail(DetailState::HoldingsReady) => f.write_str("holdings ready"),
            Self::ViewingDetail(DetailState::HoldingsEmpty) => f.write_str("no holdings"),
            Self::ViewingDetail(DetailState::HoldingsError(kind)) => {
                write!(f, "holdings error ({kind})")
            }
        }
    }
}

/// Everything the presentation layer shows. Mutated only by the
/// controller's transitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Query whose results are in `books`.
    pub query: Option<String>,
    pub books: Vec<BookSummary>,
    pub selection: Option<BookSummary>,
    pub holdings: Vec<HoldingRecord>,
    pub citations: Vec<Citation>,
    /// The condition to show, if any.
    pub condition: Option<ErrorKind>,
}

impl SessionState {
    /// Drop everything derived from the current selection.
    pub(crate) fn clear_enrichment(&mut self) {
        self.holdings.clear();
        self.citations.clear();
    }
}
