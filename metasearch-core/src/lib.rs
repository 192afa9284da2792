//! # metasearch-core
//!
//! Engine dispatch and result aggregation for a metasearch service.
//!
//! A query is fanned out concurrently to every eligible upstream engine,
//! each call bounded by its own timeout and a global deadline. Batches
//! stream into the aggregator as they complete, where duplicates are merged
//! by normalised URL (or title similarity) and ranked deterministically.
//! The response always reports the status of every eligible engine.
//!
//! ## Design
//!
//! - Engines are registered once at startup with an [`EngineAdapter`]; the
//!   [`EngineRegistry`] is read-only afterwards
//! - Failing engines are suspended by the [`BanTracker`], keyed per
//!   engine and failure reason
//! - One engine's failure, timeout or panic never affects another's results
//! - Partial results are always preferred over an error
//!
//! ## Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use metasearch_core::{Engine, EngineRegistry, JsonApiEngine, Metasearch, SearchConfig};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = metasearch_core::http::build_client(&Default::default())?;
//! let registry = EngineRegistry::builder()
//!     .category("general")
//!     .register(
//!         Engine::new("upstream", "up").with_categories(["general"]),
//!         Arc::new(JsonApiEngine::new("https://searx.example.org/search", client)?),
//!     )
//!     .build()?;
//! let metasearch = Metasearch::new(registry, SearchConfig::default())?;
//! let response = metasearch.search(&metasearch.parse("rust async")?).await;
//! for result in &response.results {
//!     println!("{:.2} {}", result.score, result.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod ban;
pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod pool;
pub mod query;
pub mod registry;
pub mod response;
pub mod types;

pub use ban::{BanPhase, BanPolicy, BanReason, BanSnapshot, BanTracker, MAX_BAN_DURATION};
pub use config::{SearchConfig, DEADLINE_CEILING};
pub use engine::EngineAdapter;
pub use engines::JsonApiEngine;
pub use error::{ConfigError, EngineFailure, FailureKind, Result, SearchError};
pub use orchestrator::{DispatchEvent, DispatchStream, Dispatcher, DomainFilter, Metasearch};
pub use pool::PoolConfig;
pub use registry::{Engine, EngineRegistry, EngineRegistryBuilder, RegisteredEngine};
pub use response::{Diagnostic, EngineReport, SearchResponse, UnresponsiveEngine};
pub use types::{
    AggregatedResult, DispatchOutcome, EngineStatus, Query, ResultItem, SafeSearch,
    DEFAULT_CATEGORY,
};
