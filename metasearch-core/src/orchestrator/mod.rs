//! Search orchestrator: concurrent dispatch, dedup, scoring, ranking.
//!
//! This module fans a query out to its eligible engines concurrently,
//! streams their batches into the aggregator as they complete,
//! deduplicates results by normalised URL or title, merges weighted scores
//! and returns a deterministically ordered result set.

pub mod aggregate;
pub mod dedup;
pub mod dispatch;
pub mod domains;
pub mod scoring;
pub mod search;
pub mod url_normalize;

pub use aggregate::{Aggregation, Aggregator};
pub use dispatch::{DispatchEvent, DispatchStream, Dispatcher};
pub use domains::DomainFilter;
pub use search::Metasearch;
