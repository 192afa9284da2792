//! Query modifier parsing.
//!
//! A raw query such as `!ddg !news :de rust async` carries selectors in its
//! leading and trailing words. `!name` picks an engine (by name or shortcut)
//! or a category, `:lang` picks a language. Everything else is query text.

use crate::error::{Result, SearchError};
use crate::registry::EngineRegistry;
use crate::types::Query;

enum Modifier {
    Engine(String),
    Category(String),
    Language(String),
}

impl Query {
    /// Parse `raw` into a query, resolving `!bang` selectors against
    /// `registry`.
    ///
    /// Selectors are only recognised at the start and end of the query; an
    /// unknown `!word` is kept as text.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EmptyQuery`] when nothing but selectors (or
    /// whitespace) remains.
    pub fn parse(raw: &str, registry: &EngineRegistry) -> Result<Self> {
        let words: Vec<&str> = raw.split_whitespace().collect();
        let mut modifiers = Vec::new();

        let mut start = 0;
        while start < words.len() {
            match parse_modifier(words[start], registry) {
                Some(modifier) => {
                    modifiers.push(modifier);
                    start += 1;
                }
                None => break,
            }
        }
        let mut end = words.len();
        while end > start {
            match parse_modifier(words[end - 1], registry) {
                Some(modifier) => {
                    modifiers.push(modifier);
                    end -= 1;
                }
                None => break,
            }
        }

        let text = words[start..end].join(" ");
        if text.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        tracing::trace!(query = %text, modifiers = modifiers.len(), "parsed query");

        let mut query = Query::new(text);
        let mut engines = Vec::new();
        let mut categories = Vec::new();
        for modifier in modifiers {
            match modifier {
                Modifier::Engine(name) => {
                    if !engines.contains(&name) {
                        engines.push(name);
                    }
                }
                Modifier::Category(name) => categories.push(name),
                Modifier::Language(lang) => query.language = lang,
            }
        }
        if !categories.is_empty() {
            query = query.with_categories(categories);
        }
        Ok(query.with_engines(engines))
    }
}

fn parse_modifier(word: &str, registry: &EngineRegistry) -> Option<Modifier> {
    if let Some(bang) = word.strip_prefix('!') {
        if bang.is_empty() {
            return None;
        }
        let lowered = bang.to_lowercase();
        if let Some(engine) = registry.lookup(bang).or_else(|| registry.lookup(&lowered)) {
            return Some(Modifier::Engine(engine.name().to_string()));
        }
        // Multi-word categories are written with underscores: `!social_media`.
        let category = lowered.replace('_', " ");
        return registry
            .has_category(&category)
            .then_some(Modifier::Category(category));
    }
    word.strip_prefix(':')
        .filter(|lang| is_language_code(lang))
        .map(|lang| Modifier::Language(lang.to_string()))
}

/// `all`, `xx` or `xx-YY`.
fn is_language_code(code: &str) -> bool {
    if code == "all" {
        return true;
    }
    let mut parts = code.splitn(2, '-');
    let primary = parts.next().unwrap_or_default();
    let primary_ok = primary.len() == 2 && primary.chars().all(|c| c.is_ascii_lowercase());
    match parts.next() {
        None => primary_ok,
        Some(region) => {
            primary_ok && region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic())
        }
    }
}
