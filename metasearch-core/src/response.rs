//! Final response packaging.
//!
//! [`SearchResponse::assemble`] is a pure function of the aggregation, the
//! query and the list of eligible engines. It attaches a status entry for
//! every eligible engine, suspended and failed ones included.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::orchestrator::aggregate::Aggregation;
use crate::types::{AggregatedResult, DispatchOutcome, EngineStatus, Query};

/// Status of one engine for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineReport {
    pub engine: String,
    pub status: EngineStatus,
    pub elapsed_ms: u64,
    /// Items the engine delivered.
    pub items: usize,
    /// Items dropped as malformed.
    pub dropped_items: usize,
    /// Items dropped because their domain is blocked.
    #[serde(default)]
    pub blocked_items: usize,
    /// Time left on the engine's suspension, when suspended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended_for_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// An engine that did not contribute, with a short reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresponsiveEngine {
    pub engine: String,
    pub reason: String,
}

/// Non-fatal conditions worth surfacing to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
    NoEligibleEngines { categories: Vec<String> },
    DeadlineExceeded { engines: Vec<String> },
    MalformedItems { engine: String, count: usize },
    AllEnginesFailed,
}

/// The structured, format-agnostic response to one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub categories: Vec<String>,
    pub language: String,
    pub page: u32,
    pub results: Vec<AggregatedResult>,
    /// Distinct results found before truncation.
    pub number_of_results: usize,
    /// One entry per eligible engine, in configuration order.
    pub engines: Vec<EngineReport>,
    pub unresponsive_engines: Vec<UnresponsiveEngine>,
    pub diagnostics: Vec<Diagnostic>,
    pub elapsed_ms: u64,
}

impl SearchResponse {
    /// Package an aggregation.
    ///
    /// `engines` lists every eligible engine in configuration order;
    /// `suspended_for` gives the remaining suspension of suspended ones.
    pub fn assemble(
        query: &Query,
        engines: &[String],
        aggregation: Aggregation,
        suspended_for: &HashMap<String, Duration>,
        elapsed: Duration,
    ) -> Self {
        let Aggregation {
            results,
            total,
            outcomes,
            dropped,
            blocked,
        } = aggregation;
        let by_engine: HashMap<&str, &DispatchOutcome> =
            outcomes.iter().map(|o| (o.engine.as_str(), o)).collect();

        let reports: Vec<EngineReport> = engines
            .iter()
            .map(|engine| {
                let dropped_items = dropped.get(engine).copied().unwrap_or(0);
                let blocked_items = blocked.get(engine).copied().unwrap_or(0);
                match by_engine.get(engine.as_str()) {
                    Some(outcome) => EngineReport {
                        engine: engine.clone(),
                        status: outcome.status,
                        elapsed_ms: millis(outcome.elapsed),
                        items: outcome.item_count,
                        dropped_items,
                        blocked_items,
                        suspended_for_secs: (outcome.status == EngineStatus::Suspended)
                            .then(|| suspended_for.get(engine).map(|d| d.as_secs()))
                            .flatten(),
                        message: outcome.message.clone(),
                    },
                    // No outcome means the stream was cut short; count it as
                    // a timeout rather than omitting the engine.
                    None => EngineReport {
                        engine: engine.clone(),
                        status: EngineStatus::Timeout,
                        elapsed_ms: millis(elapsed),
                        items: 0,
                        dropped_items,
                        blocked_items,
                        suspended_for_secs: None,
                        message: None,
                    },
                }
            })
            .collect();

        let unresponsive_engines = reports
            .iter()
            .filter(|r| !r.status.is_ok())
            .map(|r| UnresponsiveEngine {
                engine: r.engine.clone(),
                reason: r.status.to_string(),
            })
            .collect();

        let mut diagnostics = Vec::new();
        let late: Vec<String> = outcomes
            .iter()
            .filter(|o| o.deadline_exceeded)
            .map(|o| o.engine.clone())
            .collect();
        if !late.is_empty() {
            diagnostics.push(Diagnostic::DeadlineExceeded { engines: late });
        }
        for report in &reports {
            if report.dropped_items > 0 {
                diagnostics.push(Diagnostic::MalformedItems {
                    engine: report.engine.clone(),
                    count: report.dropped_items,
                });
            }
        }
        if !reports.is_empty() && !reports.iter().any(|r| r.status.is_ok()) {
            diagnostics.push(Diagnostic::AllEnginesFailed);
        }

        Self {
            query: query.text.clone(),
            categories: query.categories.clone(),
            language: query.language.clone(),
            page: query.page,
            results,
            number_of_results: total,
            engines: reports,
            unresponsive_engines,
            diagnostics,
            elapsed_ms: millis(elapsed),
        }
    }

    /// Empty-but-valid response for a query no engine serves.
    pub fn no_eligible_engines(query: &Query, elapsed: Duration) -> Self {
        Self {
            query: query.text.clone(),
            categories: query.categories.clone(),
            language: query.language.clone(),
            page: query.page,
            results: Vec::new(),
            number_of_results: 0,
            engines: Vec::new(),
            unresponsive_engines: Vec::new(),
            diagnostics: vec![Diagnostic::NoEligibleEngines {
                categories: query.categories.clone(),
            }],
            elapsed_ms: millis(elapsed),
        }
    }

    /// Whether at least one engine answered successfully.
    pub fn has_answers(&self) -> bool {
        self.engines.iter().any(|r| r.status.is_ok())
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
