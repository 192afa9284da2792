//! Rendering a [`SearchResponse`] for callers.

use std::fmt::Write as _;
use std::str::FromStr;

use metasearch_core::{Diagnostic, SearchResponse};

use crate::error::{MetasearchError, Result};
use crate::settings::SearchSettings;

/// Supported response formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl OutputFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }

    /// Parse a format name, case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" | "txt" => Some(Self::Text),
            _ => None,
        }
    }

    /// Parse `raw` and check it is enabled in `search.formats`.
    ///
    /// # Errors
    ///
    /// Returns [`MetasearchError::Format`] for unknown or disabled formats.
    pub fn enabled(raw: &str, settings: &SearchSettings) -> Result<Self> {
        let format = raw.parse::<Self>()?;
        if !settings.allows_format(format) {
            return Err(MetasearchError::Format(format!(
                "format {:?} is disabled",
                format.as_str()
            )));
        }
        Ok(format)
    }

    /// Render `response` in this format.
    ///
    /// # Errors
    ///
    /// Returns [`MetasearchError::Format`] if JSON serialisation fails.
    pub fn render(self, response: &SearchResponse) -> Result<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(response)
                .map_err(|e| MetasearchError::Format(format!("failed to serialize response: {e}"))),
            Self::Text => Ok(render_text(response)),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = MetasearchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| MetasearchError::Format(format!("unknown format {s:?}")))
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn render_text(response: &SearchResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} result(s) for {:?} [{}] in {} ms",
        response.number_of_results,
        response.query,
        response.categories.join(", "),
        response.elapsed_ms
    );

    for (i, result) in response.results.iter().enumerate() {
        let _ = writeln!(out, "\n{:>2}. {}", i + 1, result.title);
        if let Some(url) = &result.url {
            let _ = writeln!(out, "    {url}");
        }
        if !result.content.is_empty() {
            let _ = writeln!(out, "    {}", snippet(&result.content, 200));
        }
        let _ = writeln!(
            out,
            "    score {:.2} via {}",
            result.score,
            result.engines.join(", ")
        );
    }

    if !response.unresponsive_engines.is_empty() {
        let _ = writeln!(out, "\nUnresponsive engines:");
        for engine in &response.unresponsive_engines {
            let _ = writeln!(out, "  {}: {}", engine.engine, engine.reason);
        }
    }

    for diagnostic in &response.diagnostics {
        let line = match diagnostic {
            Diagnostic::NoEligibleEngines { categories } => {
                format!("no enabled engine serves {}", categories.join(", "))
            }
            Diagnostic::DeadlineExceeded { engines } => {
                format!("deadline exceeded for {}", engines.join(", "))
            }
            Diagnostic::MalformedItems { engine, count } => {
                format!("{engine} returned {count} malformed item(s)")
            }
            Diagnostic::AllEnginesFailed => "no engine answered".to_owned(),
        };
        let _ = writeln!(out, "note: {line}");
    }
    out
}

/// First `max` characters of `text` on one line.
fn snippet(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut cut: String = flat.chars().take(max).collect();
    cut.push('…');
    cut
}
