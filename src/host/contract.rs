//! Wire contract between the overlay scheduler and a native shell.
//!
//! Three newline-delimited JSON shapes, all carrying `"v": 1`:
//!
//! - [`CommandEnvelope`]: shell to scheduler, answered by exactly one
//!   [`ResponseEnvelope`] with the same `request_id`
//! - [`EventEnvelope`]: scheduler to shell, unsolicited
//!
//! Commands are dotted names (`utterance.enqueue`, `surface.mute_set`, ...).

use serde::{Deserialize, Serialize};

/// Version stamped on every envelope.
pub const CONTRACT_VERSION: u32 = 1;

/// Command set understood by the overlay host bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "utterance.enqueue")]
    UtteranceEnqueue,
    #[serde(rename = "utterance.priority_show")]
    UtterancePriorityShow,
    #[serde(rename = "reply.request")]
    ReplyRequest,
    #[serde(rename = "surface.mute_set")]
    SurfaceMuteSet,
    #[serde(rename = "surface.visibility_set")]
    SurfaceVisibilitySet,
    #[serde(rename = "surface.hover_set")]
    SurfaceHoverSet,
    #[serde(rename = "hook.fire")]
    HookFire,
    #[serde(rename = "scheduler.status")]
    SchedulerStatus,
    #[serde(rename = "config.get")]
    ConfigGet,
    #[serde(rename = "config.patch")]
    ConfigPatch,
    #[serde(rename = "runtime.stop")]
    RuntimeStop,
}

impl CommandName {
    /// Every command, in wire-table order.
    pub const ALL: [Self; 13] = [
        Self::HostPing,
        Self::HostVersion,
        Self::UtteranceEnqueue,
        Self::UtterancePriorityShow,
        Self::ReplyRequest,
        Self::SurfaceMuteSet,
        Self::SurfaceVisibilitySet,
        Self::SurfaceHoverSet,
        Self::HookFire,
        Self::SchedulerStatus,
        Self::ConfigGet,
        Self::ConfigPatch,
        Self::RuntimeStop,
    ];

    /// Dotted wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::UtteranceEnqueue => "utterance.enqueue",
            Self::UtterancePriorityShow => "utterance.priority_show",
            Self::ReplyRequest => "reply.request",
            Self::SurfaceMuteSet => "surface.mute_set",
            Self::SurfaceVisibilitySet => "surface.visibility_set",
            Self::SurfaceHoverSet => "surface.hover_set",
            Self::HookFire => "hook.fire",
            Self::SchedulerStatus => "scheduler.status",
            Self::ConfigGet => "config.get",
            Self::ConfigPatch => "config.patch",
            Self::RuntimeStop => "runtime.stop",
        }
    }

    /// Look up a dotted wire name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }
}

/// Answer to one command.
///
/// `payload` is `null` and `error` is set when `ok` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
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

/// One command from the shell. A missing `payload` reads as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: CONTRACT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Reject envelopes from another contract version or without an id to
    /// answer to.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != CONTRACT_VERSION {
            return Err(ContractError::UnsupportedVersion { found: self.v });
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::MissingRequestId);
        }
        Ok(())
    }
}

/// Unsolicited notification to the shell (`surface.render`, `hook.fired`, ...).
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

    /// Event with a fresh random id.
    #[must_use]
    pub fn fresh(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), event, payload)
    }
}

/// Why a command envelope was refused before routing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("unsupported contract version {found}; expected {CONTRACT_VERSION}")]
    UnsupportedVersion { found: u32 },
    #[error("request_id cannot be empty")]
    MissingRequestId,
}
