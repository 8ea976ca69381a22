//! Holdings inference: which nearby libraries hold a given book.
//!
//! A grounded generative request is built from the book and a location
//! hint. The reply text goes through [`extract`](extract::extract); the
//! grounding metadata becomes the citation list for the whole result set.

pub mod extract;

use std::collections::HashSet;
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use crate::llm::{GenerativeBackend, GroundingSource};
use crate::model::{BookSummary, Citation, HoldingRecord, LocationHint};

pub use extract::{ExtractError, PayloadSource};

/// Default number of holdings requested.
pub const DEFAULT_MAX_HOLDINGS: usize = 3;

/// Errors from holdings inference.
///
/// The two variants get different user guidance: the first means the call
/// did not complete, the second that it completed with an unusable answer.
#[derive(Debug, Error, Diagnostic)]
pub enum HoldingsError {
    #[error("holdings inference failed: {message}")]
    #[diagnostic(
        code(scout::holdings::unavailable),
        help("Could not retrieve real-time holdings. Please try again.")
    )]
    InferenceUnavailable { message: String },

    #[error("malformed holdings data: {0}")]
    #[diagnostic(
        code(scout::holdings::malformed),
        help("Could not parse the holdings data. Please try again.")
    )]
    Malformed(#[from] ExtractError),
}

pub type HoldingsResult<T> = std::result::Result<T, HoldingsError>;

/// Holdings for one book plus the sources consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoldingsReport {
    pub holdings: Vec<HoldingRecord>,
    pub citations: Vec<Citation>,
}

/// Issues grounded holdings requests.
pub struct HoldingsInference {
    backend: Arc<dyn GenerativeBackend>,
    max_holdings: usize,
}

impl HoldingsInference {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self {
            backend,
            max_holdings: DEFAULT_MAX_HOLDINGS,
        }
    }

    pub fn with_max_holdings(mut self, max: usize) -> Self {
        self.max_holdings = max.max(1);
        self
    }

    /// The instruction sent upstream. Advisory only: the reply is parsed
    /// defensively whatever it looks like.
    pub fn build_prompt(&self, book: &BookSummary, location: &LocationHint) -> String {
        let authors = match &book.authors {
            Some(names) if !names.is_empty() => format!(" by {}", names.join(", ")),
            _ => String::new(),
        };
        format!(
            "Find public or academic libraries near {location} that hold a physical copy \
             of the book \"{title}\"{authors}. Prefer libraries closest to that location. \
             Return at most {max} libraries. For each library give:\n\
             - \"library\": the library name\n\
             - \"address\": its street address\n\
             - \"callNumber\": the call number of the book at that library\n\
             - \"availability\": the current availability status, as the catalog shows it\n\
             - \"directions\": how to find the shelf inside the building (floor, section, shelf range)\n\
             - \"website\": the catalog or library URL, if known (optional)\n\
             Respond with JSON only: a single array of objects with exactly these fields, \
             wrapped in a ```json fenced block. If no library holds the book, respond with [].",
            title = book.title,
            max = self.max_holdings,
        )
    }

    /// Ask upstream for holdings of `book` near `location`.
    pub fn fetch_holdings(
        &self,
        book: &BookSummary,
        location: &LocationHint,
    ) -> HoldingsResult<HoldingsReport> {
        let prompt = self.build_prompt(book, location);
        tracing::info!(book = %book.key, %location, "requesting holdings");

        let reply = self.backend.generate_grounded(&prompt).map_err(|e| {
            tracing::warn!(error = %e, book = %book.key, "holdings inference failed");
            HoldingsError::InferenceUnavailable {
                message: e.to_string(),
            }
        })?;

        let holdings = extract::extract(&reply.text).inspect_err(|e| {
            tracing::warn!(error = %e, book = %book.key, "holdings reply not decodable");
        })?;
        let citations = citations_from_sources(reply.sources);
        tracing::info!(
            book = %book.key,
            holdings = holdings.len(),
            citations = citations.len(),
            "holdings ready"
        );

        Ok(HoldingsReport {
            holdings,
            citations,
        })
    }
}

impl std::fmt::Debug for HoldingsInference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HoldingsInference")
            .field("max_holdings", &self.max_holdings)
            .finish()
    }
}

/// Keep sources that carry both a title and a URI, first occurrence per URI.
pub fn citations_from_sources(sources: Vec<GroundingSource>) -> Vec<Citation> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter_map(|s| match (s.title, s.uri) {
            (Some(title), Some(uri)) if !title.trim().is_empty() && !uri.trim().is_empty() => {
                Some(Citation { title, uri })
            }
            _ => None,
        })
        .filter(|c| seen.insert(c.uri.clone()))
        .collect()
}
