//! Shelf view synthesis for a single holding.
//!
//! Image generation is expensive and rate-limited, so at most one request is
//! outstanding per visualizer at any time. A caller arriving while one is in
//! flight is turned away with [`ShelfOutcome::Busy`] rather than queued.
//! Successful images are memoized by holding index until the next
//! [`reset`](ShelfVisualizer::reset).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use miette::Diagnostic;
use thiserror::Error;

use crate::llm::{GenerativeBackend, InlinePayload};
use crate::model::ShelfImage;

/// Errors from shelf image generation. The caller may simply retry.
#[derive(Debug, Error, Diagnostic)]
pub enum ShelfError {
    #[error("image request failed: {message}")]
    #[diagnostic(
        code(scout::shelf::request_failed),
        help("The shelf view is optional. Request it again to retry.")
    )]
    Request { message: String },

    #[error("image reply contained no usable image")]
    #[diagnostic(
        code(scout::shelf::no_image),
        help("The model answered without an image. Request it again to retry.")
    )]
    NoUsableImage,
}

pub type ShelfResult<T> = std::result::Result<T, ShelfError>;

/// One shelf view request, tagged with the selection epoch it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfRequest {
    pub epoch: u64,
    /// Position of the holding in the current holdings list.
    pub index: usize,
    pub library: String,
    pub call_number: String,
}

/// What a [`ShelfVisualizer::generate`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShelfOutcome {
    /// A new image was generated and memoized.
    Generated(ShelfImage),
    /// The image was already memoized; no request was made.
    Memoized(ShelfImage),
    /// Another generation is in flight; nothing happened.
    Busy,
    /// The selection changed; any result was discarded.
    Stale,
}

/// Clears the in-flight flag on every exit path.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight, memoizing shelf image generator.
pub struct ShelfVisualizer {
    backend: Arc<dyn GenerativeBackend>,
    in_flight: AtomicBool,
    epoch: AtomicU64,
    memo: Mutex<HashMap<usize, ShelfImage>>,
}

impl ShelfVisualizer {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self {
            backend,
            in_flight: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Instruction for the image model.
    pub fn build_prompt(library: &str, call_number: &str) -> String {
        let shelf = if call_number.trim().is_empty() {
            "the shelf where this book would be kept".to_string()
        } else {
            format!("the shelf holding call number {call_number}")
        };
        format!(
            "A photorealistic photo taken inside {library}, showing the bookshelves \
             in the stacks, focused on {shelf}. Natural library lighting, eye-level \
             perspective, spine labels visible, no people."
        )
    }

    /// Generate (or return the memoized) image for one holding.
    pub fn generate(&self, request: &ShelfRequest) -> ShelfResult<ShelfOutcome> {
        {
            let memo = self.memo();
            if request.epoch != self.epoch() {
                return Ok(ShelfOutcome::Stale);
            }
            if let Some(image) = memo.get(&request.index) {
                return Ok(ShelfOutcome::Memoized(image.clone()));
            }
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(index = request.index, "shelf generation already in flight");
            return Ok(ShelfOutcome::Busy);
        }
        let _guard = InFlight(&self.in_flight);

        // A generation for this index may have finished between the memo
        // check and acquiring the flag.
        if let Some(image) = self.memo().get(&request.index) {
            return Ok(ShelfOutcome::Memoized(image.clone()));
        }

        tracing::info!(
            index = request.index,
            library = %request.library,
            "generating shelf view"
        );
        let prompt = Self::build_prompt(&request.library, &request.call_number);
        let payloads = self.backend.generate_image(&prompt).map_err(|e| {
            tracing::warn!(error = %e, "shelf image request failed");
            ShelfError::Request {
                message: e.to_string(),
            }
        })?;
        let image = first_usable_image(&payloads).ok_or(ShelfError::NoUsableImage)?;

        let mut memo = self.memo();
        if request.epoch != self.epoch() {
            tracing::debug!(index = request.index, "discarding shelf view for stale selection");
            return Ok(ShelfOutcome::Stale);
        }
        memo.insert(request.index, image.clone());
        Ok(ShelfOutcome::Generated(image))
    }

    /// Forget every memoized image and start a new epoch. Returns the new
    /// epoch; requests tagged with an older one are discarded.
    pub fn reset(&self) -> u64 {
        let mut memo = self.memo();
        memo.clear();
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Memoized image for a holding index.
    pub fn cached(&self, index: usize) -> Option<ShelfImage> {
        self.memo().get(&index).cloned()
    }

    /// Whether a generation is in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn memo(&self) -> MutexGuard<'_, HashMap<usize, ShelfImage>> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ShelfVisualizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShelfVisualizer")
            .field("in_flight", &self.is_busy())
            .field("epoch", &self.epoch())
            .field("memoized", &self.memo().len())
            .finish()
    }
}

/// First payload that is an image and decodes.
fn first_usable_image(payloads: &[InlinePayload]) -> Option<ShelfImage> {
    payloads
        .iter()
        .filter(|p| p.mime_type.starts_with("image/"))
        .find_map(|p| match ShelfImage::from_base64(&p.mime_type, &p.data) {
            Ok(image) if !image.bytes.is_empty() => Some(image),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "skipping undecodable inline payload");
                None
            }
        })
}
