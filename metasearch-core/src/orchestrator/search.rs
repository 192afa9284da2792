//! The search pipeline: dispatch, aggregate, assemble.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;

use crate::ban::BanTracker;
use crate::config::SearchConfig;
use crate::error::{ConfigError, Result, SearchError};
use crate::registry::EngineRegistry;
use crate::response::SearchResponse;
use crate::types::Query;

use super::aggregate::Aggregator;
use super::dispatch::Dispatcher;

/// A configured metasearch pipeline.
///
/// Owns the ban tracker shared by every query it runs. Cheap to share
/// behind an `Arc`; `search` takes `&self`.
#[derive(Debug)]
pub struct Metasearch {
    registry: Arc<EngineRegistry>,
    config: SearchConfig,
    bans: Arc<BanTracker>,
    dispatcher: Dispatcher,
}

impl Metasearch {
    /// Build a pipeline over `registry`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` fails validation.
    pub fn new(registry: EngineRegistry, config: SearchConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let registry = Arc::new(registry);
        let bans = Arc::new(BanTracker::new(config.bans.clone()));
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&bans));
        Ok(Self {
            registry,
            config,
            bans,
            dispatcher,
        })
    }

    /// Parse a raw query string with `!bang` and `:lang` selectors.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EmptyQuery`] if no text remains.
    pub fn parse(&self, raw: &str) -> Result<Query> {
        Query::parse(raw, &self.registry)
    }

    /// Run `query` through the whole pipeline.
    ///
    /// Engine-level failures never surface as errors: they show up in the
    /// response's engine reports and diagnostics instead.
    pub async fn search(&self, query: &Query) -> SearchResponse {
        let started = Instant::now();
        tracing::trace!(query = %query.text, "search requested");

        let timeouts: Vec<_> = self.registry.select(query).iter().map(|e| e.timeout).collect();
        let deadline = self.config.deadline_for(query, &timeouts);

        let stream = match self.dispatcher.dispatch(query, deadline) {
            Ok(stream) => stream,
            Err(SearchError::NoEligibleEngines { categories }) => {
                tracing::warn!(categories = ?categories, "no eligible engines for query");
                return SearchResponse::no_eligible_engines(query, started.elapsed());
            }
            Err(err) => {
                tracing::error!(error = %err, "dispatch failed");
                return SearchResponse::no_eligible_engines(query, started.elapsed());
            }
        };
        let engines = stream.engines().to_vec();

        let aggregation = Aggregator::new(
            &self.registry,
            self.config.max_results,
            self.config.title_similarity_threshold,
        )
        .with_domain_filter(self.config.domain_filter())
        .collect(stream)
        .await;

        let now = Instant::now();
        let suspended_for: HashMap<String, _> = engines
            .iter()
            .filter_map(|engine| {
                self.bans
                    .suspended_until(engine, now)
                    .map(|until| (engine.clone(), until - now))
            })
            .collect();

        let response = SearchResponse::assemble(
            query,
            &engines,
            aggregation,
            &suspended_for,
            started.elapsed(),
        );
        tracing::info!(
            results = response.results.len(),
            engines = response.engines.len(),
            unresponsive = response.unresponsive_engines.len(),
            elapsed_ms = response.elapsed_ms,
            "search complete"
        );
        response
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn bans(&self) -> &BanTracker {
        &self.bans
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }
}
