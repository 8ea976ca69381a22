// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # shelfscout
//!
//! Find a book, then find the nearest shelf it sits on.
//!
//! ## Architecture
//!
//! - **Result cache** (`cache`): durable normalized-query → book list map
//! - **Book search** (`search`): cache-through catalog search, capped at 12
//! - **Holdings inference** (`holdings`): grounded generative lookup of nearby
//!   library holdings, with tolerant JSON extraction (`holdings::extract`)
//! - **Shelf views** (`shelf`): single-flight, memoized image synthesis
//! - **Pipeline** (`pipeline`): the state machine driving all of the above
//!
//! ## Library usage
//!
//! ```no_run
//! use shelfscout::cache::ResultCache;
//! use shelfscout::config::ScoutConfig;
//! use shelfscout::pipeline::PipelineController;
//!
//! let config = ScoutConfig::default();
//! let mut pipeline = PipelineController::from_config(&config, ResultCache::in_memory());
//! let books = pipeline.search("The Left Hand of Darkness").unwrap();
//! if !books.is_empty() {
//!     pipeline.open_book(0).unwrap();
//!     for holding in &pipeline.session().holdings {
//!         println!("{} ({})", holding.library, holding.call_number);
//!     }
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod holdings;
pub mod llm;
pub mod model;
pub mod paths;
pub mod pipeline;
pub mod search;
pub mod shelf;
