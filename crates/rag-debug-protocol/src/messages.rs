//! Envelopes exchanged over the socket, one JSON object per text frame.
//!
//! | Direction | `type` | Purpose |
//! |-----------|--------|---------|
//! | server → client | `hello` | protocol version, capabilities, server info |
//! | server → client | `welcome` | session id and buffered-event replay |
//! | server → client | `event` | one live [`DebugEvent`] |
//! | server → client | `result` | reply to a command, correlated by `requestId` |
//! | server → client | `error` | fatal protocol error (e.g. `protocol_mismatch`) |
//! | client → server | `hello` | supported protocol versions |
//! | client → server | `command` | a [`DebugCommand`] with a fresh `requestId` |
//!
//! Decoding is tolerant: anything that is not valid JSON or not a known
//! variant decodes to `None` and is dropped by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commands::{DebugCommand, DebugCommandResult};
use crate::events::DebugEvent;

/// Describes the process hosting the debug server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// URL the server is reachable at (e.g. `ws://127.0.0.1:3847`).
    pub endpoint: String,
    /// Process id of the host application.
    pub pid: u32,
    /// Runtime label, including the active socket stack.
    pub runtime: String,
}

/// Messages sent by the debug server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Hello {
        protocol_version: u32,
        capabilities: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_info: Option<ServerInfo>,
    },
    Welcome {
        session_id: String,
        buffered_events: Vec<DebugEvent>,
    },
    Event {
        event: DebugEvent,
    },
    Result {
        request_id: String,
        result: DebugCommandResult,
    },
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

impl ServerMessage {
    /// The wire discriminant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Welcome { .. } => "welcome",
            Self::Event { .. } => "event",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Messages sent by the inspector client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Hello {
        supported_protocol_versions: Vec<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_info: Option<Value>,
    },
    Command {
        request_id: String,
        command: DebugCommand,
    },
}

impl ClientMessage {
    /// Serialize to a text frame.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Decode a text frame received by the server.
pub fn decode_client_message(text: &str) -> Option<ClientMessage> {
    serde_json::from_str(text).ok()
}

/// Decode a text frame received by the client.
pub fn decode_server_message(text: &str) -> Option<ServerMessage> {
    serde_json::from_str(text).ok()
}
