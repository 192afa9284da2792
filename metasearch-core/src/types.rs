//! Core types flowing through the dispatch and aggregation pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::FailureKind;

/// Category used when a query does not request any.
pub const DEFAULT_CATEGORY: &str = "general";

/// Safe-search filtering level forwarded to engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafeSearch {
    Off,
    #[default]
    Moderate,
    Strict,
}

impl SafeSearch {
    /// Numeric level used by most upstream APIs (0, 1, 2).
    pub fn level(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Moderate => 1,
            Self::Strict => 2,
        }
    }

    /// Parse a numeric level, clamping anything above 2 to `Strict`.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Self::Off,
            1 => Self::Moderate,
            _ => Self::Strict,
        }
    }
}

/// An incoming user query. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Query text with all modifiers removed.
    pub text: String,
    /// Requested categories, never empty, sorted and unique.
    pub categories: Vec<String>,
    /// Engines selected explicitly (by name). When non-empty, categories
    /// are ignored for engine selection.
    pub engines: Vec<String>,
    pub safe_search: SafeSearch,
    /// Language code, or `"all"`.
    pub language: String,
    /// 1-based result page.
    pub page: u32,
    /// Optional per-query cap on the global deadline.
    pub timeout_limit: Option<Duration>,
}

impl Query {
    /// Build a query for `text` with default settings.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            categories: vec![DEFAULT_CATEGORY.to_string()],
            engines: Vec::new(),
            safe_search: SafeSearch::default(),
            language: "all".to_string(),
            page: 1,
            timeout_limit: None,
        }
    }

    /// Replace the requested categories. An empty list falls back to
    /// [`DEFAULT_CATEGORY`].
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cats: Vec<String> = categories
            .into_iter()
            .map(Into::into)
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        cats.sort();
        cats.dedup();
        if cats.is_empty() {
            cats.push(DEFAULT_CATEGORY.to_string());
        }
        self.categories = cats;
        self
    }

    pub fn with_engines<I, S>(mut self, engines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.engines = engines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_safe_search(mut self, safe_search: SafeSearch) -> Self {
        self.safe_search = safe_search;
        self
    }

    /// Set the page; page 0 is treated as page 1.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_timeout_limit(mut self, limit: Duration) -> Self {
        self.timeout_limit = Some(limit);
        self
    }

    /// Zero-based result offset for the current page.
    pub fn offset(&self, page_size: usize) -> usize {
        (self.page.max(1) as usize - 1) * page_size
    }
}

/// A single result item produced by an engine adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    /// Name of the engine that produced this item. Overwritten by the
    /// dispatcher, so adapters may leave it empty.
    #[serde(default)]
    pub engine: String,
    /// Target address. Items without one are deduplicated by title.
    pub url: Option<String>,
    pub title: String,
    /// Text snippet summarising the target.
    #[serde(default)]
    pub content: String,
    /// Engine-native relevance score, when the upstream provides one.
    pub score: Option<f64>,
    /// Structured payload such as an infobox.
    pub payload: Option<serde_json::Value>,
}

impl ResultItem {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            engine: String::new(),
            url: Some(url.into()),
            title: title.into(),
            content: String::new(),
            score: None,
            payload: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A result after merging duplicates from one or more engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub url: Option<String>,
    pub title: String,
    pub content: String,
    /// Sum of every contribution's weighted score.
    pub score: f64,
    /// Contributing engines, unique, in registry order.
    pub engines: Vec<String>,
    pub payload: Option<serde_json::Value>,
}

/// Final status of one engine for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "kind", rename_all = "snake_case")]
pub enum EngineStatus {
    Ok,
    Timeout,
    Error(FailureKind),
    Suspended,
}

impl EngineStatus {
    /// Map a failure to the status reported for it.
    pub fn from_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Timeout => Self::Timeout,
            other => Self::Error(other),
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// The failure kind this status counts as for ban tracking, if any.
    pub fn failure_kind(self) -> Option<FailureKind> {
        match self {
            Self::Ok | Self::Suspended => None,
            Self::Timeout => Some(FailureKind::Timeout),
            Self::Error(kind) => Some(kind),
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Timeout => f.write_str("timeout"),
            Self::Error(kind) => write!(f, "error ({kind})"),
            Self::Suspended => f.write_str("suspended"),
        }
    }
}

/// What happened when one engine was (or was not) called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub engine: String,
    pub status: EngineStatus,
    pub elapsed: Duration,
    /// Items the engine delivered (before malformed items are dropped).
    pub item_count: usize,
    /// Set when the engine was cut off by the global deadline rather than
    /// its own timeout.
    #[serde(default)]
    pub deadline_exceeded: bool,
    /// Human-readable failure detail, if any.
    #[serde(default)]
    pub message: Option<String>,
}

impl DispatchOutcome {
    pub fn ok(engine: impl Into<String>, elapsed: Duration, item_count: usize) -> Self {
        Self {
            engine: engine.into(),
            status: EngineStatus::Ok,
            elapsed,
            item_count,
            deadline_exceeded: false,
            message: None,
        }
    }

    pub fn failed(
        engine: impl Into<String>,
        kind: FailureKind,
        elapsed: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self {
            engine: engine.into(),
            status: EngineStatus::from_failure(kind),
            elapsed,
            item_count: 0,
            deadline_exceeded: false,
            message: Some(message.into()),
        }
    }

    pub fn suspended(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            status: EngineStatus::Suspended,
            elapsed: Duration::ZERO,
            item_count: 0,
            deadline_exceeded: false,
            message: None,
        }
    }

    pub fn deadline_exceeded(engine: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            engine: engine.into(),
            status: EngineStatus::Timeout,
            elapsed,
            item_count: 0,
            deadline_exceeded: true,
            message: Some("global deadline elapsed".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults() {
        let q = Query::new("rust");
        assert_eq!(q.categories, vec!["general".to_string()]);
        assert_eq!(q.safe_search, SafeSearch::Moderate);
        assert_eq!(q.language, "all");
        assert_eq!(q.page, 1);
        assert!(q.engines.is_empty());
        assert!(q.timeout_limit.is_none());
    }

    #[test]
    fn empty_categories_fall_back_to_general() {
        let q = Query::new("rust").with_categories(Vec::<String>::new());
        assert_eq!(q.categories, vec!["general".to_string()]);
        let q = Query::new("rust").with_categories(["  ", ""]);
        assert_eq!(q.categories, vec!["general".to_string()]);
    }

    #[test]
    fn categories_are_normalised_sorted_and_unique() {
        let q = Query::new("rust").with_categories(["News", "images", "news"]);
        assert_eq!(q.categories, vec!["images".to_string(), "news".to_string()]);
    }

    #[test]
    fn page_zero_is_page_one() {
        let q = Query::new("rust").with_page(0);
        assert_eq!(q.page, 1);
        assert_eq!(q.offset(10), 0);
        assert_eq!(Query::new("rust").with_page(3).offset(10), 20);
    }

    #[test]
    fn safe_search_levels() {
        assert_eq!(SafeSearch::Off.level(), 0);
        assert_eq!(SafeSearch::from_level(1), SafeSearch::Moderate);
        assert_eq!(SafeSearch::from_level(9), SafeSearch::Strict);
    }

    #[test]
    fn status_from_failure() {
        assert_eq!(
            EngineStatus::from_failure(FailureKind::Timeout),
            EngineStatus::Timeout
        );
        assert_eq!(
            EngineStatus::from_failure(FailureKind::Captcha),
            EngineStatus::Error(FailureKind::Captcha)
        );
        assert_eq!(EngineStatus::Suspended.failure_kind(), None);
        assert_eq!(
            EngineStatus::Timeout.failure_kind(),
            Some(FailureKind::Timeout)
        );
    }

    #[test]
    fn status_serializes_tagged() {
        let json = serde_json::to_value(EngineStatus::Error(FailureKind::AccessDenied))
            .expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"state": "error", "kind": "access_denied"})
        );
        let json = serde_json::to_value(EngineStatus::Ok).expect("serialize");
        assert_eq!(json, serde_json::json!({"state": "ok"}));
    }

    #[test]
    fn result_item_deserializes_with_missing_optional_fields() {
        let item: ResultItem =
            serde_json::from_str(r#"{"url": "https://a.com", "title": "A", "score": null, "payload": null}"#)
                .expect("deserialize");
        assert_eq!(item.engine, "");
        assert_eq!(item.content, "");
        assert_eq!(item.url.as_deref(), Some("https://a.com"));
    }

    #[test]
    fn deadline_outcome_is_flagged() {
        let outcome = DispatchOutcome::deadline_exceeded("slow", Duration::from_secs(2));
        assert_eq!(outcome.status, EngineStatus::Timeout);
        assert!(outcome.deadline_exceeded);
    }
}
