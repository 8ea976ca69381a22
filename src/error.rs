//! Rich diagnostic error types for shelfscout.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives
//! so the CLI can print an error code and an actionable hint. Every upstream
//! failure is converted to one of the [`ErrorKind`]s at the component boundary;
//! raw transport errors never reach the pipeline controller.

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::holdings::HoldingsError;
use crate::llm::LlmError;
use crate::paths::PathError;
use crate::search::SearchError;
use crate::shelf::ShelfError;

/// Top-level error type.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum ScoutError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Holdings(#[from] HoldingsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Shelf(#[from] ShelfError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),
}

/// The user-facing failure taxonomy.
///
/// `NoMatches` and `VisualizerFailure` are conditions rather than banners:
/// the first is guidance, the second is silent because the shelf view is a
/// secondary enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    UpstreamUnavailable,
    NoMatches,
    InferenceUnavailable,
    MalformedHoldingsData,
    VisualizerFailure,
}

impl ErrorKind {
    /// Short, actionable message for the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable => {
                "Could not reach the book catalog. Check your connection and try again."
            }
            Self::NoMatches => "No books found. Try a different title or author.",
            Self::InferenceUnavailable => {
                "Could not retrieve real-time holdings. Please try again."
            }
            Self::MalformedHoldingsData => "Could not parse the holdings data. Please try again.",
            Self::VisualizerFailure => "Shelf view unavailable.",
        }
    }

    /// Whether this kind is shown as an error banner.
    pub fn is_banner(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable | Self::InferenceUnavailable | Self::MalformedHoldingsData
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UpstreamUnavailable => "upstream-unavailable",
            Self::NoMatches => "no-matches",
            Self::InferenceUnavailable => "inference-unavailable",
            Self::MalformedHoldingsData => "malformed-holdings-data",
            Self::VisualizerFailure => "visualizer-failure",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("empty query")]
    #[diagnostic(
        code(scout::pipeline::empty_query),
        help("Type a title or an author name before searching.")
    )]
    EmptyQuery,

    #[error("no item at position {index} (only {available} available)")]
    #[diagnostic(
        code(scout::pipeline::invalid_selection),
        help("Pick a position from the list that is currently shown.")
    )]
    InvalidSelection { index: usize, available: usize },

    #[error("no holdings are ready for a shelf view")]
    #[diagnostic(
        code(scout::pipeline::not_ready),
        help("Select a book and wait for its holdings before asking for a shelf view.")
    )]
    HoldingsNotReady,

    #[error("book catalog unavailable: {message}")]
    #[diagnostic(
        code(scout::pipeline::upstream_unavailable),
        help("Could not reach the book catalog. Check your connection and try again.")
    )]
    UpstreamUnavailable { message: String },

    #[error("no books match \"{query}\"")]
    #[diagnostic(
        code(scout::pipeline::no_matches),
        help("No books found. Try a different title or author.")
    )]
    NoMatches { query: String },

    #[error("holdings inference unavailable: {message}")]
    #[diagnostic(
        code(scout::pipeline::inference_unavailable),
        help("Could not retrieve real-time holdings. Please try again.")
    )]
    InferenceUnavailable { message: String },

    #[error("malformed holdings data: {message}")]
    #[diagnostic(
        code(scout::pipeline::malformed_holdings),
        help("Could not parse the holdings data. Please try again.")
    )]
    MalformedHoldingsData { message: String },

    #[error("shelf view generation failed: {message}")]
    #[diagnostic(
        code(scout::pipeline::visualizer_failure),
        help("The shelf view is optional. Request it again to retry.")
    )]
    VisualizerFailure { message: String },
}

impl PipelineError {
    /// The taxonomy kind, if this is an upstream-derived failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::EmptyQuery | Self::InvalidSelection { .. } | Self::HoldingsNotReady => None,
            Self::UpstreamUnavailable { .. } => Some(ErrorKind::UpstreamUnavailable),
            Self::NoMatches { .. } => Some(ErrorKind::NoMatches),
            Self::InferenceUnavailable { .. } => Some(ErrorKind::InferenceUnavailable),
            Self::MalformedHoldingsData { .. } => Some(ErrorKind::MalformedHoldingsData),
            Self::VisualizerFailure { .. } => Some(ErrorKind::VisualizerFailure),
        }
    }

    pub(crate) fn from_search(e: &SearchError) -> Self {
        Self::UpstreamUnavailable {
            message: e.to_string(),
        }
    }

    pub(crate) fn from_holdings(e: &HoldingsError) -> Self {
        match e {
            HoldingsError::InferenceUnavailable { message } => Self::InferenceUnavailable {
                message: message.clone(),
            },
            HoldingsError::Malformed(inner) => Self::MalformedHoldingsData {
                message: inner.to_string(),
            },
        }
    }
}

impl From<SearchError> for PipelineError {
    fn from(e: SearchError) -> Self {
        Self::from_search(&e)
    }
}

impl From<HoldingsError> for PipelineError {
    fn from(e: HoldingsError) -> Self {
        Self::from_holdings(&e)
    }
}

impl From<ShelfError> for PipelineError {
    fn from(e: ShelfError) -> Self {
        Self::VisualizerFailure {
            message: e.to_string(),
        }
    }
}

/// Convenience alias for top-level results.
pub type ScoutResult<T> = std::result::Result<T, ScoutError>;
