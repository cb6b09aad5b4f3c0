//! Versioned trigger/response/event envelopes for native shell integration.

use crate::service::{ServiceEvent, ServiceMode};
use serde::{Deserialize, Serialize};

/// Contract version for host envelopes.
pub const CONTRACT_VERSION: u32 = 1;

/// Action answered by the bridge itself instead of the dispatcher.
pub const STATUS_ACTION: &str = "service.status";

/// A trigger delivered by the host.
///
/// A missing or null `action` is a host restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    #[serde(default)]
    pub action: Option<String>,
}

impl CommandEnvelope {
    #[must_use]
    pub fn new(request_id: impl Into<String>, action: Option<&str>) -> Self {
        Self {
            v: CONTRACT_VERSION,
            request_id: request_id.into(),
            action: action.map(ToOwned::to_owned),
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != CONTRACT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, CONTRACT_VERSION
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

    #[must_use]
    pub fn is_status_query(&self) -> bool {
        self.action.as_deref() == Some(STATUS_ACTION)
    }
}

/// Response to one [`CommandEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: CONTRACT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: CONTRACT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Unsolicited notification from the service to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: CONTRACT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }

    /// Wrap a service hook event with a fresh event id.
    #[must_use]
    pub fn from_service_event(event: ServiceEvent) -> Self {
        let mode = match event {
            ServiceEvent::EnteredForeground => ServiceMode::Foreground,
            ServiceEvent::EnteredBackground | ServiceEvent::StopSelfRequested => {
                ServiceMode::Background
            }
        };
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            event.as_str(),
            serde_json::json!({ "mode": mode }),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
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

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}

impl From<ContractError> for crate::error::ServiceError {
    fn from(e: ContractError) -> Self {
        Self::Contract(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn missing_action_deserializes_as_restart() {
        let envelope: CommandEnvelope =
            serde_json::from_str(r#"{"v":1,"request_id":"r1"}"#).expect("parse");
        assert_eq!(envelope.action, None);
        assert!(envelope.validate().is_ok());
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut envelope = CommandEnvelope::new("r1", Some("service.start"));
        envelope.v = 2;
        let err = envelope.validate().unwrap_err();
        assert_eq!(err.kind, ContractErrorKind::UnsupportedVersion);
    }

    #[test]
    fn blank_request_id_is_rejected() {
        let envelope = CommandEnvelope::new("  ", Some("service.start"));
        let err = envelope.validate().unwrap_err();
        assert_eq!(err.kind, ContractErrorKind::InvalidEnvelope);
    }

    #[test]
    fn status_query_is_detected() {
        assert!(CommandEnvelope::new("r1", Some(STATUS_ACTION)).is_status_query());
        assert!(!CommandEnvelope::new("r1", None).is_status_query());
    }

    #[test]
    fn service_event_envelope_carries_mode() {
        let envelope = EventEnvelope::from_service_event(ServiceEvent::EnteredForeground);
        assert_eq!(envelope.event, "service.entered_foreground");
        assert_eq!(envelope.payload["mode"], "foreground");
        assert!(!envelope.event_id.is_empty());

        let envelope = EventEnvelope::from_service_event(ServiceEvent::StopSelfRequested);
        assert_eq!(envelope.event, "service.stop_self");
        assert_eq!(envelope.payload["mode"], "background");
    }
}
