//! Caller-facing search request, shared by the CLI and the bridge.

use std::time::Duration;

use metasearch_core::{DEADLINE_CEILING, DEFAULT_CATEGORY, Metasearch, Query, SafeSearch};
use serde::{Deserialize, Serialize};

use crate::error::{MetasearchError, Result};
use crate::settings::SearchSettings;

/// A search as callers send it. Unset fields take the `[search]` defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Raw query text, `!bang` and `:lang` selectors included.
    pub q: String,
    pub categories: Vec<String>,
    pub language: Option<String>,
    pub page: Option<u32>,
    /// 0 = off, 1 = moderate, 2 = strict.
    pub safe_search: Option<u8>,
    /// Seconds.
    pub timeout_limit: Option<f64>,
}

impl SearchRequest {
    #[must_use]
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Self::default()
        }
    }

    /// Resolve into a core [`Query`].
    ///
    /// Explicit request fields win over selectors in the text, which win
    /// over the configured defaults.
    ///
    /// # Errors
    ///
    /// Returns [`MetasearchError::Search`] for an empty query and
    /// [`MetasearchError::Request`] for out-of-range fields.
    pub fn resolve(&self, metasearch: &Metasearch, defaults: &SearchSettings) -> Result<Query> {
        let mut query = metasearch.parse(&self.q)?;

        let selected_by_text =
            !query.engines.is_empty() || query.categories != [DEFAULT_CATEGORY];
        if !self.categories.is_empty() {
            query = query.with_categories(self.categories.iter().cloned());
        } else if !selected_by_text {
            query = query.with_categories(defaults.default_categories.iter().cloned());
        }

        if let Some(language) = &self.language {
            query = query.with_language(language.clone());
        } else if query.language == "all" {
            query = query.with_language(defaults.default_lang.clone());
        }

        let level = self.safe_search.unwrap_or(defaults.safe_search);
        if level > 2 {
            return Err(MetasearchError::Request(format!(
                "safe_search must be 0, 1 or 2, got {level}"
            )));
        }
        query = query.with_safe_search(SafeSearch::from_level(level));

        match self.page {
            Some(0) => {
                return Err(MetasearchError::Request("page must be >= 1".to_owned()));
            }
            Some(page) => query = query.with_page(page),
            None => {}
        }

        if let Some(secs) = self.timeout_limit {
            let limit = Duration::try_from_secs_f64(secs)
                .ok()
                .filter(|d| !d.is_zero() && *d <= DEADLINE_CEILING)
                .ok_or_else(|| {
                    MetasearchError::Request(format!(
                        "timeout_limit must be between 0 and {} seconds, got {secs}",
                        DEADLINE_CEILING.as_secs()
                    ))
                })?;
            query = query.with_timeout_limit(limit);
        }
        Ok(query)
    }
}
