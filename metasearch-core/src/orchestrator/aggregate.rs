//! Streaming result aggregation.
//!
//! The [`Aggregator`] consumes dispatch events as they arrive, validates and
//! scores each item, and feeds it to the [`Deduplicator`]. Once the stream
//! closes, groups are ranked deterministically: combined score descending,
//! then contributor count descending, then first arrival.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::registry::EngineRegistry;
use crate::types::{AggregatedResult, DispatchOutcome, ResultItem};

use super::dedup::{normalize_title, DedupKey, Deduplicator, Placement};
use super::dispatch::{DispatchEvent, DispatchStream};
use super::domains::{domain_of, DomainFilter};
use super::scoring::contribution;
use super::url_normalize::normalize_url;

/// Everything the aggregator learned from one dispatch.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Ranked results, truncated to the configured maximum.
    pub results: Vec<AggregatedResult>,
    /// Number of distinct results before truncation, after the per-domain
    /// cap.
    pub total: usize,
    /// One outcome per engine, in arrival order.
    pub outcomes: Vec<DispatchOutcome>,
    /// Malformed items dropped, per engine.
    pub dropped: BTreeMap<String, usize>,
    /// Items from blocked domains dropped, per engine.
    pub blocked: BTreeMap<String, usize>,
}

/// Incrementally merges result batches from a dispatch.
pub struct Aggregator<'a> {
    registry: &'a EngineRegistry,
    max_results: usize,
    dedup: Deduplicator,
    domains: DomainFilter,
    outcomes: Vec<DispatchOutcome>,
    dropped: BTreeMap<String, usize>,
    blocked: BTreeMap<String, usize>,
}

impl<'a> Aggregator<'a> {
    pub fn new(registry: &'a EngineRegistry, max_results: usize, title_similarity: f64) -> Self {
        Self {
            registry,
            max_results,
            dedup: Deduplicator::new(title_similarity),
            domains: DomainFilter::default(),
            outcomes: Vec::new(),
            dropped: BTreeMap::new(),
            blocked: BTreeMap::new(),
        }
    }

    /// Apply `filter` to every item pushed from now on.
    pub fn with_domain_filter(mut self, filter: DomainFilter) -> Self {
        self.domains = filter;
        self
    }

    /// Drain `stream` and rank everything it delivered.
    pub async fn collect(mut self, mut stream: DispatchStream) -> Aggregation {
        while let Some(event) = stream.next_event().await {
            self.push(event);
        }
        self.finish()
    }

    /// Merge one engine's batch.
    pub fn push(&mut self, event: DispatchEvent) {
        let DispatchEvent {
            outcome,
            items,
            arrival,
        } = event;
        let engine_index = self.registry.index_of(&outcome.engine);
        let weight = self.registry.weight_of(&outcome.engine);

        for (position, item) in items.into_iter().enumerate() {
            let Some(key) = dedup_key(&item) else {
                tracing::warn!(
                    engine = %outcome.engine,
                    position,
                    url = item.url.as_deref().unwrap_or_default(),
                    "dropping malformed result item"
                );
                *self.dropped.entry(outcome.engine.clone()).or_default() += 1;
                continue;
            };
            if let Some(domain) = self.blocked_domain(&item) {
                tracing::debug!(
                    engine = %outcome.engine,
                    position,
                    domain = %domain,
                    "dropping result from blocked domain"
                );
                *self.blocked.entry(outcome.engine.clone()).or_default() += 1;
                continue;
            }
            let placement = Placement {
                engine_index,
                arrival,
                position,
                contribution: contribution(weight, item.score, position),
            };
            self.dedup.insert(key, item, placement);
        }
        self.outcomes.push(outcome);
    }

    /// Rank the merged groups and close the aggregation.
    pub fn finish(self) -> Aggregation {
        let mut groups = self.dedup.into_groups();
        groups.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.contributor_count().cmp(&a.contributor_count()))
                .then_with(|| a.first_seen().cmp(&b.first_seen()))
        });
        let mut ranked: Vec<AggregatedResult> =
            groups.into_iter().map(|group| group.into_result()).collect();
        if let Some(cap) = self.domains.max_per_domain() {
            let mut seen: HashMap<String, usize> = HashMap::new();
            ranked.retain(|result| {
                let Some(domain) = result.url.as_deref().and_then(domain_of) else {
                    return true;
                };
                let count = seen.entry(domain).or_default();
                *count += 1;
                *count <= cap
            });
        }
        let total = ranked.len();
        ranked.truncate(self.max_results);

        Aggregation {
            results: ranked,
            total,
            outcomes: self.outcomes,
            dropped: self.dropped,
            blocked: self.blocked,
        }
    }

    fn blocked_domain(&self, item: &ResultItem) -> Option<String> {
        let domain = domain_of(item.url.as_deref()?)?;
        self.domains.is_blocked(&domain).then_some(domain)
    }
}

/// Identity of a well-formed item, or `None` if it must be dropped.
///
/// A title is required. A URL is optional, but when present it must parse.
fn dedup_key(item: &ResultItem) -> Option<DedupKey> {
    let title = normalize_title(&item.title);
    if title.is_empty() {
        return None;
    }
    match item.url.as_deref().map(str::trim) {
        None | Some("") => Some(DedupKey::Title(title)),
        Some(url) => normalize_url(url).map(DedupKey::Url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineAdapter;
    use crate::error::EngineFailure;
    use crate::registry::Engine;
    use crate::types::Query;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct NullEngine;

    #[async_trait]
    impl EngineAdapter for NullEngine {
        async fn fetch(
            &self,
            _query: &Query,
            _timeout: Duration,
        ) -> Result<Vec<ResultItem>, EngineFailure> {
            Ok(Vec::new())
        }
    }

    fn registry() -> EngineRegistry {
        EngineRegistry::builder()
            .category("general")
            .register(
                Engine::new("a", "a").with_categories(["general"]),
                Arc::new(NullEngine),
            )
            .register(
                Engine::new("b", "b")
                    .with_categories(["general"])
                    .with_weight(2.0),
                Arc::new(NullEngine),
            )
            .build()
            .expect("registry")
    }

    fn event(engine: &str, arrival: usize, items: Vec<ResultItem>) -> DispatchEvent {
        let items: Vec<ResultItem> = items
            .into_iter()
            .map(|mut i| {
                i.engine = engine.to_string();
                i
            })
            .collect();
        DispatchEvent {
            outcome: DispatchOutcome::ok(engine, Duration::from_millis(10), items.len()),
            items,
            arrival,
        }
    }

    #[test]
    fn weighted_sum_across_engines() {
        let registry = registry();
        let mut agg = Aggregator::new(&registry, 10, 0.9);
        agg.push(event("b", 0, vec![ResultItem::new("https://x.com/", "X").with_score(1.0)]));
        agg.push(event("a", 1, vec![ResultItem::new("http://x.com", "X").with_score(1.0)]));
        let result = agg.finish();
        assert_eq!(result.results.len(), 1);
        let x = &result.results[0];
        assert!((x.score - 3.0).abs() < f64::EPSILON);
        assert_eq!(x.engines, vec!["a", "b"]);
        assert_eq!(x.url.as_deref(), Some("https://x.com/"));
    }

    #[test]
    fn ordering_is_independent_of_arrival_for_distinct_scores() {
        let registry = registry();
        let batch_a = vec![
            ResultItem::new("https://one.com", "One"),
            ResultItem::new("https://two.com", "Two"),
        ];
        let batch_b = vec![ResultItem::new("https://three.com", "Three")];

        let mut first = Aggregator::new(&registry, 10, 0.9);
        first.push(event("a", 0, batch_a.clone()));
        first.push(event("b", 1, batch_b.clone()));
        let mut second = Aggregator::new(&registry, 10, 0.9);
        second.push(event("b", 0, batch_b));
        second.push(event("a", 1, batch_a));

        let urls = |agg: Aggregation| -> Vec<Option<String>> {
            agg.results.into_iter().map(|r| r.url).collect()
        };
        let expected = vec![
            Some("https://three.com".to_string()),
            Some("https://one.com".to_string()),
            Some("https://two.com".to_string()),
        ];
        assert_eq!(urls(first.finish()), expected);
        assert_eq!(urls(second.finish()), expected);
    }

    #[test]
    fn ties_broken_by_contributors_then_arrival() {
        let registry = registry();
        let mut agg = Aggregator::new(&registry, 10, 0.9);
        agg.push(event(
            "a",
            0,
            vec![
                ResultItem::new("https://solo.com", "Solo").with_score(3.0),
                ResultItem::new("https://shared.com", "Shared").with_score(1.0),
                ResultItem::new("https://late.com", "Late").with_score(3.0),
            ],
        ));
        agg.push(event(
            "b",
            1,
            vec![ResultItem::new("https://shared.com", "Shared").with_score(1.0)],
        ));
        let titles: Vec<String> = agg.finish().results.into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["Shared", "Solo", "Late"]);
    }

    #[test]
    fn malformed_items_are_dropped_and_counted() {
        let registry = registry();
        let mut agg = Aggregator::new(&registry, 10, 0.9);
        agg.push(event(
            "a",
            0,
            vec![
                ResultItem::new("https://ok.com", "Fine"),
                ResultItem::new("https://ok2.com", "   "),
                ResultItem::new("not a url", "Broken"),
            ],
        ));
        let result = agg.finish();
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.dropped.get("a"), Some(&2));
        assert_eq!(result.outcomes.len(), 1);
    }

    #[test]
    fn url_less_items_dedup_by_title() {
        let registry = registry();
        let mut agg = Aggregator::new(&registry, 10, 0.9);
        let mut infobox = ResultItem::new("", "Rust (programming language)");
        infobox.url = None;
        infobox.payload = Some(serde_json::json!({"kind": "infobox"}));
        let mut blank_url = ResultItem::new("  ", "rust (programming language)");
        blank_url.content = "Longer description".into();
        agg.push(event("a", 0, vec![infobox]));
        agg.push(event("b", 1, vec![blank_url]));
        let result = agg.finish();
        assert_eq!(result.results.len(), 1);
        let merged = &result.results[0];
        assert_eq!(merged.url, None);
        assert_eq!(merged.engines, vec!["a", "b"]);
        assert_eq!(merged.content, "Longer description");
        assert!(merged.payload.is_some());
    }

    #[test]
    fn truncates_but_reports_total() {
        let registry = registry();
        let mut agg = Aggregator::new(&registry, 2, 0.9);
        agg.push(event(
            "a",
            0,
            (0..5)
                .map(|i| ResultItem::new(format!("https://r{i}.com"), format!("R{i}")))
                .collect(),
        ));
        let result = agg.finish();
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.total, 5);
        assert_eq!(result.results[0].title, "R0");
    }

    #[test]
    fn empty_batches_contribute_nothing() {
        let registry = registry();
        let mut agg = Aggregator::new(&registry, 10, 0.9);
        agg.push(event("a", 0, vec![]));
        agg.push(DispatchEvent {
            outcome: DispatchOutcome::suspended("b"),
            items: vec![],
            arrival: 1,
        });
        let result = agg.finish();
        assert!(result.results.is_empty());
        assert_eq!(result.outcomes.len(), 2);
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn blocked_domains_are_dropped_before_merging() {
        let registry = registry();
        let mut agg = Aggregator::new(&registry, 10, 0.9)
            .with_domain_filter(DomainFilter::new(["lenovo.com", "reddit"], None));
        agg.push(event(
            "a",
            0,
            vec![
                ResultItem::new("https://support.lenovo.com/x", "Drivers"),
                ResultItem::new("https://keep.example/a", "Keep"),
            ],
        ));
        agg.push(event(
            "b",
            1,
            vec![
                ResultItem::new("https://www.reddit.com/r/rust", "Thread"),
                ResultItem::new("https://keep.example/a", "Keep"),
            ],
        ));
        let result = agg.finish();
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].engines, vec!["a", "b"]);
        assert_eq!(result.blocked.get("a"), Some(&1));
        assert_eq!(result.blocked.get("b"), Some(&1));
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn per_domain_cap_keeps_best_ranked() {
        let registry = registry();
        let mut agg = Aggregator::new(&registry, 10, 0.9)
            .with_domain_filter(DomainFilter::new(Vec::<String>::new(), Some(1)));
        agg.push(event(
            "a",
            0,
            vec![
                ResultItem::new("https://docs.example/one", "One"),
                ResultItem::new("https://www.docs.example/two", "Two"),
                ResultItem::new("https://other.example", "Other"),
            ],
        ));
        let mut no_url = ResultItem::new("", "Infobox");
        no_url.url = None;
        agg.push(event("b", 1, vec![no_url]));
        let result = agg.finish();
        let titles: Vec<_> = result.results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Infobox", "One", "Other"]);
        assert_eq!(result.total, 3);
    }

    #[test]
    fn url_less_item_stays_apart_from_same_titled_url_result() {
        let registry = registry();
        let mut agg = Aggregator::new(&registry, 10, 0.9);
        let mut infobox = ResultItem::new("", "Rust");
        infobox.url = None;
        agg.push(event("a", 0, vec![infobox]));
        agg.push(event("b", 1, vec![ResultItem::new("https://rust-lang.org", "Rust")]));
        let result = agg.finish();
        assert_eq!(result.results.len(), 2);
        assert!(result.results.iter().all(|r| r.engines.len() == 1));
    }
}
