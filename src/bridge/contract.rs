//! Versioned command/response envelopes for the stdio bridge.

use serde::{Deserialize, Serialize};

/// Contract version for bridge envelopes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Request id used for replies to lines that could not be parsed.
pub const PARSE_ERROR_ID: &str = "parse-error";

/// Commands the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "search")]
    Search,
    #[serde(rename = "engines.list")]
    EnginesList,
    #[serde(rename = "engines.status")]
    EnginesStatus,
    #[serde(rename = "runtime.stop")]
    RuntimeStop,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::Search => "search",
            Self::EnginesList => "engines.list",
            Self::EnginesStatus => "engines.status",
            Self::RuntimeStop => "runtime.stop",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "host.ping" => Some(Self::HostPing),
            "search" => Some(Self::Search),
            "engines.list" => Some(Self::EnginesList),
            "engines.status" => Some(Self::EnginesStatus),
            "runtime.stop" => Some(Self::RuntimeStop),
            _ => None,
        }
    }
}

/// A versioned response envelope written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope read from stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != PROTOCOL_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, PROTOCOL_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn command_names_roundtrip_through_wire_format() {
        for name in [
            CommandName::HostPing,
            CommandName::Search,
            CommandName::EnginesList,
            CommandName::EnginesStatus,
            CommandName::RuntimeStop,
        ] {
            assert_eq!(CommandName::parse(name.as_str()), Some(name));
            let wire = serde_json::to_value(name).unwrap();
            assert_eq!(wire, json!(name.as_str()));
        }
        assert_eq!(CommandName::parse("runtime.start"), None);
    }

    #[test]
    fn payload_defaults_to_null() {
        let envelope: CommandEnvelope =
            serde_json::from_str(r#"{"v":1,"request_id":"r1","command":"host.ping"}"#).unwrap();
        assert_eq!(envelope.payload, serde_json::Value::Null);
        assert!(envelope.validate().is_ok());
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut envelope = CommandEnvelope::new("r1", CommandName::HostPing, json!({}));
        envelope.v = 2;
        let err = envelope.validate().unwrap_err();
        assert_eq!(err.kind, ContractErrorKind::UnsupportedVersion);
    }

    #[test]
    fn blank_request_id_is_rejected() {
        let envelope = CommandEnvelope::new("  ", CommandName::HostPing, json!({}));
        let err = envelope.validate().unwrap_err();
        assert_eq!(err.kind, ContractErrorKind::InvalidEnvelope);
    }

    #[test]
    fn error_envelope_has_null_payload() {
        let resp = ResponseEnvelope::error(PARSE_ERROR_ID, "bad json");
        assert!(!resp.ok);
        assert_eq!(resp.payload, serde_json::Value::Null);
        assert_eq!(resp.v, PROTOCOL_VERSION);
    }
}
