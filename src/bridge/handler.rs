//! Command routing for the stdio bridge.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metasearch_core::{BanPhase, BanReason, Metasearch};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::bridge::contract::{CommandEnvelope, CommandName, ResponseEnvelope};
use crate::request::SearchRequest;
use crate::settings::SearchSettings;

/// One engine in an `engines.list` reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineEntry {
    pub name: String,
    pub shortcut: String,
    pub categories: Vec<String>,
    pub enabled: bool,
    pub weight: f64,
    pub timeout_ms: u64,
}

/// Ban state of one `(engine, reason)` pair in an `engines.status` reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BanEntry {
    pub reason: BanReason,
    pub phase: BanPhase,
    pub failure_streak: u32,
    pub suspended_until: Option<DateTime<Utc>>,
}

/// One engine in an `engines.status` reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineHealth {
    pub engine: String,
    pub suspended: bool,
    pub bans: Vec<BanEntry>,
}

/// Routes validated commands to the search pipeline.
#[derive(Debug, Clone)]
pub struct BridgeHandler {
    metasearch: Arc<Metasearch>,
    defaults: SearchSettings,
    instance_name: String,
}

impl BridgeHandler {
    #[must_use]
    pub fn new(
        metasearch: Arc<Metasearch>,
        defaults: SearchSettings,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            metasearch,
            defaults,
            instance_name: instance_name.into(),
        }
    }

    /// Handle one command. Never fails: problems become error envelopes.
    pub async fn handle(&self, envelope: CommandEnvelope) -> ResponseEnvelope {
        if let Err(e) = envelope.validate() {
            warn!(request_id = %envelope.request_id, error = %e, "rejected command envelope");
            return ResponseEnvelope::error(envelope.request_id, e.to_string());
        }
        debug!(
            request_id = %envelope.request_id,
            command = envelope.command.as_str(),
            "handling command"
        );

        let id = envelope.request_id;
        match envelope.command {
            CommandName::HostPing => ResponseEnvelope::ok(
                id,
                json!({
                    "pong": true,
                    "instance": self.instance_name,
                    "version": env!("CARGO_PKG_VERSION"),
                }),
            ),
            CommandName::Search => match self.search(envelope.payload).await {
                Ok(payload) => ResponseEnvelope::ok(id, payload),
                Err(message) => ResponseEnvelope::error(id, message),
            },
            CommandName::EnginesList => to_envelope(id, &self.engines()),
            CommandName::EnginesStatus => to_envelope(id, &self.status(Utc::now())),
            CommandName::RuntimeStop => {
                info!("runtime.stop received");
                ResponseEnvelope::ok(id, json!({ "stopping": true }))
            }
        }
    }

    async fn search(&self, payload: Value) -> Result<Value, String> {
        if payload.is_null() {
            return Err("search payload is required".to_owned());
        }
        let request: SearchRequest =
            serde_json::from_value(payload).map_err(|e| format!("invalid search payload: {e}"))?;
        let query = request
            .resolve(&self.metasearch, &self.defaults)
            .map_err(|e| e.to_string())?;
        let response = self.metasearch.search(&query).await;
        serde_json::to_value(&response).map_err(|e| format!("failed to serialize response: {e}"))
    }

    /// Every registered engine in configuration order.
    #[must_use]
    pub fn engines(&self) -> Vec<EngineEntry> {
        self.metasearch
            .registry()
            .engines()
            .iter()
            .map(|registered| EngineEntry {
                name: registered.engine.name.clone(),
                shortcut: registered.engine.shortcut.clone(),
                categories: registered.engine.categories.iter().cloned().collect(),
                enabled: registered.engine.enabled,
                weight: registered.engine.weight,
                timeout_ms: u64::try_from(registered.timeout.as_millis()).unwrap_or(u64::MAX),
            })
            .collect()
    }

    /// Ban state of every registered engine, with suspensions converted
    /// to wall-clock time relative to `now`.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> Vec<EngineHealth> {
        let bans = self.metasearch.bans();
        let instant = tokio::time::Instant::now();
        let snapshot = bans.snapshot(instant);
        self.metasearch
            .registry()
            .engines()
            .iter()
            .map(|registered| {
                let name = registered.name();
                let entries = snapshot
                    .iter()
                    .filter(|s| s.engine == name)
                    .map(|s| BanEntry {
                        reason: s.reason,
                        phase: s.phase,
                        failure_streak: s.failure_streak,
                        suspended_until: s
                            .remaining
                            .and_then(|r| chrono::Duration::from_std(r).ok())
                            .and_then(|r| now.checked_add_signed(r)),
                    })
                    .collect();
                EngineHealth {
                    engine: name.to_owned(),
                    suspended: bans.is_suspended(name, instant),
                    bans: entries,
                }
            })
            .collect()
    }
}

fn to_envelope<T: Serialize>(id: String, payload: &T) -> ResponseEnvelope {
    match serde_json::to_value(payload) {
        Ok(value) => ResponseEnvelope::ok(id, value),
        Err(e) => ResponseEnvelope::error(id, format!("failed to serialize payload: {e}")),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::bridge::contract::PROTOCOL_VERSION;
    use crate::settings::{EngineSettings, Settings};
    use metasearch_core::{EngineStatus, FailureKind};

    fn handler() -> BridgeHandler {
        let mut settings = Settings::default();
        settings.engines.push(EngineSettings {
            name: "upstream".to_owned(),
            shortcut: "up".to_owned(),
            base_url: Some("https://upstream.example/search".to_owned()),
            ..EngineSettings::default()
        });
        let metasearch = Arc::new(settings.build().unwrap());
        BridgeHandler::new(metasearch, settings.search, "test-instance")
    }

    fn command(command: CommandName, payload: Value) -> CommandEnvelope {
        CommandEnvelope::new("req-1", command, payload)
    }

    #[tokio::test]
    async fn ping_reports_instance() {
        let resp = handler().handle(command(CommandName::HostPing, json!({}))).await;
        assert!(resp.ok);
        assert_eq!(resp.request_id, "req-1");
        assert_eq!(resp.payload["instance"], "test-instance");
    }

    #[tokio::test]
    async fn invalid_envelope_is_an_error_response() {
        let mut envelope = command(CommandName::HostPing, json!({}));
        envelope.v = PROTOCOL_VERSION + 1;
        let resp = handler().handle(envelope).await;
        assert!(!resp.ok);
        assert!(resp.error.unwrap().contains("unsupported contract version"));
    }

    #[tokio::test]
    async fn search_requires_payload() {
        let resp = handler()
            .handle(command(CommandName::Search, Value::Null))
            .await;
        assert!(!resp.ok);
    }

    #[tokio::test]
    async fn empty_query_is_an_error_response() {
        let resp = handler()
            .handle(command(CommandName::Search, json!({ "q": "   " })))
            .await;
        assert!(!resp.ok);
        assert!(resp.error.unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn engines_list_describes_registry() {
        let resp = handler()
            .handle(command(CommandName::EnginesList, Value::Null))
            .await;
        assert!(resp.ok);
        assert_eq!(resp.payload[0]["name"], "upstream");
        assert_eq!(resp.payload[0]["shortcut"], "up");
        assert_eq!(resp.payload[0]["timeout_ms"], 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn status_converts_suspension_to_wall_clock() {
        let handler = handler();
        handler.metasearch.bans().record_outcome(
            "upstream",
            EngineStatus::Error(FailureKind::TooManyRequests),
        );
        let now = Utc::now();
        let status = handler.status(now);
        assert_eq!(status.len(), 1);
        assert!(status[0].suspended);
        let until = status[0].bans[0].suspended_until.unwrap();
        assert_eq!((until - now).num_seconds(), 3600);
    }

    #[tokio::test]
    async fn stop_acknowledges() {
        let resp = handler()
            .handle(command(CommandName::RuntimeStop, Value::Null))
            .await;
        assert!(resp.ok);
        assert_eq!(resp.payload["stopping"], true);
    }
}
