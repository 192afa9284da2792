//! Result deduplication and merging.
//!
//! Items that refer to the same resource are grouped: by normalised URL
//! when they have one, otherwise by title similarity. Each group keeps every
//! engine's contribution so that the merged result can be computed in
//! registry order once all items are in, independent of arrival order.

use std::collections::{BTreeMap, HashMap};

use crate::types::{AggregatedResult, ResultItem};

use super::scoring::combine;
use super::url_normalize::is_insecure;

/// Identity an item is deduplicated under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupKey {
    /// Normalised URL, see [`super::url_normalize::normalize_url`].
    Url(String),
    /// Normalised title, see [`normalize_title`].
    Title(String),
}

/// Where an item came from and what it is worth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Configuration index of the source engine.
    pub engine_index: usize,
    /// Dispatch event the item arrived in.
    pub arrival: usize,
    /// Position within the engine's batch.
    pub position: usize,
    /// Weighted score contribution.
    pub contribution: f64,
}

#[derive(Debug, Clone)]
struct Contribution {
    item: ResultItem,
    placement: Placement,
}

/// One aggregated result under construction.
#[derive(Debug, Clone)]
pub struct MergedGroup {
    /// Best contribution per engine, keyed by configuration index.
    contributions: BTreeMap<usize, Contribution>,
    first_seen: (usize, usize),
}

impl MergedGroup {
    fn new(item: ResultItem, placement: Placement) -> Self {
        let mut contributions = BTreeMap::new();
        contributions.insert(placement.engine_index, Contribution { item, placement });
        Self {
            contributions,
            first_seen: (placement.arrival, placement.position),
        }
    }

    fn add(&mut self, item: ResultItem, placement: Placement) {
        self.first_seen = self.first_seen.min((placement.arrival, placement.position));
        match self.contributions.get(&placement.engine_index) {
            // Same engine twice: keep its better placement only.
            Some(existing)
                if (existing.placement.contribution, std::cmp::Reverse(existing.placement.position))
                    >= (placement.contribution, std::cmp::Reverse(placement.position)) => {}
            _ => {
                self.contributions
                    .insert(placement.engine_index, Contribution { item, placement });
            }
        }
    }

    /// Sum of contributions, added up in registry order.
    pub fn score(&self) -> f64 {
        combine(self.contributions.values().map(|c| c.placement.contribution))
    }

    /// Number of distinct contributing engines.
    pub fn contributor_count(&self) -> usize {
        self.contributions.len()
    }

    /// `(arrival, position)` of the earliest item merged into this group.
    pub fn first_seen(&self) -> (usize, usize) {
        self.first_seen
    }

    /// Produce the merged result.
    ///
    /// Title comes from the first engine in registry order; content is the
    /// longest snippet (ties go to the earlier engine); an `https` URL wins
    /// over an `http` one; the first payload in registry order is kept.
    pub fn into_result(self) -> AggregatedResult {
        let score = self.score();
        let contributions: Vec<ResultItem> = self
            .contributions
            .into_values()
            .map(|c| c.item)
            .collect();

        let url = contributions
            .iter()
            .filter_map(|c| c.url.as_deref())
            .find(|u| !is_insecure(u))
            .or_else(|| contributions.iter().find_map(|c| c.url.as_deref()))
            .map(str::to_string);

        let content = contributions
            .iter()
            .map(|c| c.content.as_str())
            .fold("", |best, candidate| {
                if candidate.chars().count() > best.chars().count() {
                    candidate
                } else {
                    best
                }
            })
            .to_string();

        let payload = contributions.iter().find_map(|c| c.payload.clone());
        let title = contributions
            .first()
            .map(|c| c.title.clone())
            .unwrap_or_default();
        let engines = contributions.iter().map(|c| c.engine.clone()).collect();

        AggregatedResult {
            url,
            title,
            content,
            score,
            engines,
            payload,
        }
    }
}

/// Groups items as they arrive.
///
/// URL keys and title keys live in separate namespaces. An item without a
/// URL is only ever compared by title against other URL-less groups, so a
/// URL-less infobox stays apart from a same-titled result that has a URL.
#[derive(Debug)]
pub struct Deduplicator {
    threshold: f64,
    groups: Vec<MergedGroup>,
    by_url: HashMap<String, usize>,
    by_title: Vec<(String, usize)>,
}

impl Deduplicator {
    /// `threshold` is the Jaro-Winkler similarity at or above which two
    /// titles are considered the same.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            groups: Vec::new(),
            by_url: HashMap::new(),
            by_title: Vec::new(),
        }
    }

    /// Merge `item` into the group for `key`, creating it if needed.
    pub fn insert(&mut self, key: DedupKey, item: ResultItem, placement: Placement) {
        let existing = match &key {
            DedupKey::Url(url) => self.by_url.get(url).copied(),
            DedupKey::Title(title) => self.similar_title(title),
        };
        match existing {
            Some(index) => self.groups[index].add(item, placement),
            None => {
                let index = self.groups.len();
                self.groups.push(MergedGroup::new(item, placement));
                match key {
                    DedupKey::Url(url) => {
                        self.by_url.insert(url, index);
                    }
                    DedupKey::Title(title) => self.by_title.push((title, index)),
                }
            }
        }
    }

    /// Best matching URL-less group; ties go to the older group.
    fn similar_title(&self, title: &str) -> Option<usize> {
        let mut best: Option<(f64, usize)> = None;
        for (candidate, index) in &self.by_title {
            let similarity = strsim::jaro_winkler(title, candidate);
            if similarity >= self.threshold && best.map_or(true, |(s, _)| similarity > s) {
                best = Some((similarity, *index));
            }
        }
        best.map(|(_, index)| index)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn into_groups(self) -> Vec<MergedGroup> {
        self.groups
    }
}

/// Lowercase `title` and collapse runs of whitespace.
///
/// Only used to key items without a URL; results with a URL never match on
/// title.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
