//! Session Protocol Types
//!
//! Inbound events arrive as JSON objects discriminated by `for_type`. They are
//! decoded here into [`SessionEvent`] before any session logic runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::message::{Message, null_as_default};
use crate::status::EnvironmentStatus;

/// Port whose tunnel serves the live preview.
pub const PREVIEW_PORT: u16 = 3000;

/// Events sent FROM the server TO the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "for_type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Environment status, tunnels and file tree
    Status(StatusEvent),
    /// Authoritative replacement of one message
    ChatUpdate(ChatUpdateEvent),
    /// Incremental text for the in-progress assistant turn
    ChatChunk(ChatChunkEvent),
    /// Any tag this client does not know about
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_status: Option<String>,
    /// Internal port → externally reachable URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnels: Option<HashMap<u16, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_paths: Option<Vec<String>>,
}

impl StatusEvent {
    /// The reported environment status, if present and recognized.
    pub fn environment(&self) -> Option<EnvironmentStatus> {
        self.sandbox_status
            .as_deref()
            .and_then(EnvironmentStatus::from_wire)
    }

    /// The preview URL from the tunnel map. `Some(None)` means the event
    /// carried tunnels but none for the preview port.
    pub fn preview_url(&self) -> Option<Option<String>> {
        self.tunnels
            .as_ref()
            .map(|tunnels| tunnels.get(&PREVIEW_PORT).cloned())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatUpdateEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_ups: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigate_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChunkEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thinking_content: String,
}

impl SessionEvent {
    /// Decode one raw inbound value.
    pub fn decode(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Status(_) => "status",
            SessionEvent::ChatUpdate(_) => "chat_update",
            SessionEvent::ChatChunk(_) => "chat_chunk",
            SessionEvent::Unknown => "unknown",
        }
    }
}
