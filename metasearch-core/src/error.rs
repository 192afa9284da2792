//! Error types for the metasearch-core crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. Engine-level failures ([`EngineFailure`])
//! never escape the dispatcher; they are converted into
//! [`crate::types::DispatchOutcome`] values instead.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Invalid engine or category definitions. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An engine was registered without a name.
    #[error("engine at position {0} has an empty name")]
    EmptyEngineName(usize),

    /// Two engines share a name.
    #[error("duplicate engine name: {0}")]
    DuplicateEngine(String),

    /// Two engines share a shortcut.
    #[error("shortcut {shortcut:?} of engine {engine} is already used by {existing}")]
    DuplicateShortcut {
        shortcut: String,
        engine: String,
        existing: String,
    },

    /// An engine references a category that was never declared.
    #[error("engine {engine} references undefined category {category:?}")]
    UnknownCategory { engine: String, category: String },

    /// A field holds a value outside its valid range.
    #[error("{0}")]
    Invalid(String),
}

/// Why a single engine call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The call did not finish within its time budget.
    Timeout,
    /// The upstream refused access (HTTP 403 and friends).
    AccessDenied,
    /// The upstream answered with a captcha challenge.
    Captcha,
    /// The upstream is rate limiting us (HTTP 429).
    TooManyRequests,
    /// The response could not be decoded.
    ParseError,
    /// Transport-level failure.
    NetworkError,
    /// The engine's connection pool and its wait queue were both full.
    PoolExhausted,
    /// The adapter panicked.
    Panicked,
}

impl FailureKind {
    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::AccessDenied => "access_denied",
            Self::Captcha => "captcha",
            Self::TooManyRequests => "too_many_requests",
            Self::ParseError => "parse_error",
            Self::NetworkError => "network_error",
            Self::PoolExhausted => "pool_exhausted",
            Self::Panicked => "panicked",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed engine call, as reported by an adapter or by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EngineFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl EngineFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ParseError, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NetworkError, message)
    }
}

/// Errors surfaced to callers of the search pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Invalid search configuration or registry definition.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// No enabled, matching engine exists for the query.
    #[error("no eligible engines for categories: {}", .categories.join(", "))]
    NoEligibleEngines { categories: Vec<String> },

    /// The query text is empty once modifiers are removed.
    #[error("empty query")]
    EmptyQuery,
}

/// Convenience type alias for metasearch-core results.
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_duplicate_shortcut() {
        let err = ConfigError::DuplicateShortcut {
            shortcut: "ddg".into(),
            engine: "duck".into(),
            existing: "duckduckgo".into(),
        };
        assert_eq!(
            err.to_string(),
            "shortcut \"ddg\" of engine duck is already used by duckduckgo"
        );
    }

    #[test]
    fn display_unknown_category() {
        let err = ConfigError::UnknownCategory {
            engine: "wiki".into(),
            category: "encyclopedia".into(),
        };
        assert_eq!(
            err.to_string(),
            "engine wiki references undefined category \"encyclopedia\""
        );
    }

    #[test]
    fn display_engine_failure() {
        let err = EngineFailure::new(FailureKind::Captcha, "challenge page");
        assert_eq!(err.to_string(), "captcha: challenge page");
    }

    #[test]
    fn display_no_eligible_engines() {
        let err = SearchError::NoEligibleEngines {
            categories: vec!["images".into(), "music".into()],
        };
        assert_eq!(
            err.to_string(),
            "no eligible engines for categories: images, music"
        );
    }

    #[test]
    fn config_error_converts_into_search_error() {
        let err: SearchError = ConfigError::DuplicateEngine("bing".into()).into();
        assert_eq!(err.to_string(), "config error: duplicate engine name: bing");
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::TooManyRequests).expect("serialize");
        assert_eq!(json, "\"too_many_requests\"");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
        assert_send_sync::<EngineFailure>();
    }
}
