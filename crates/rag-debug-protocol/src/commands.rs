//! Commands an inspector can issue and the results it gets back.
//!
//! A [`DebugCommand`] travels inside a `command` envelope together with a
//! request id; the server answers with exactly one [`DebugCommandResult`]
//! carrying the same `type` discriminant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

fn default_top_k() -> usize {
    8
}

/// A request from the inspector, tagged on the wire by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum DebugCommand {
    /// Run a retrieval against the registered engine.
    Query {
        query: String,
        #[serde(default = "default_top_k")]
        top_k: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<Value>,
    },
    /// Ingest one document through the registered engine.
    Ingest {
        source_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunking: Option<Value>,
    },
    ListDocuments {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<usize>,
    },
    GetDocument {
        source_id: String,
    },
    DeleteDocument {
        source_id: String,
    },
    DeleteChunks {
        chunk_ids: Vec<String>,
    },
    StoreStats,
    Doctor,
    RunEval {
        dataset: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Value>,
    },
    Ping,
    ClearBuffer,
    GetBuffer,
}

impl DebugCommand {
    /// The discriminant of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Query { .. } => CommandKind::Query,
            Self::Ingest { .. } => CommandKind::Ingest,
            Self::ListDocuments { .. } => CommandKind::ListDocuments,
            Self::GetDocument { .. } => CommandKind::GetDocument,
            Self::DeleteDocument { .. } => CommandKind::DeleteDocument,
            Self::DeleteChunks { .. } => CommandKind::DeleteChunks,
            Self::StoreStats => CommandKind::StoreStats,
            Self::Doctor => CommandKind::Doctor,
            Self::RunEval { .. } => CommandKind::RunEval,
            Self::Ping => CommandKind::Ping,
            Self::ClearBuffer => CommandKind::ClearBuffer,
            Self::GetBuffer => CommandKind::GetBuffer,
        }
    }
}

/// Discriminant shared by a command and its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    Query,
    Ingest,
    ListDocuments,
    GetDocument,
    DeleteDocument,
    DeleteChunks,
    StoreStats,
    Doctor,
    RunEval,
    Ping,
    ClearBuffer,
    GetBuffer,
}

impl CommandKind {
    /// Every command kind, in declaration order.
    pub const ALL: [CommandKind; 12] = [
        Self::Query,
        Self::Ingest,
        Self::ListDocuments,
        Self::GetDocument,
        Self::DeleteDocument,
        Self::DeleteChunks,
        Self::StoreStats,
        Self::Doctor,
        Self::RunEval,
        Self::Ping,
        Self::ClearBuffer,
        Self::GetBuffer,
    ];

    /// The wire name (e.g. `"list-documents"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Ingest => "ingest",
            Self::ListDocuments => "list-documents",
            Self::GetDocument => "get-document",
            Self::DeleteDocument => "delete-document",
            Self::DeleteChunks => "delete-chunks",
            Self::StoreStats => "store-stats",
            Self::Doctor => "doctor",
            Self::RunEval => "run-eval",
            Self::Ping => "ping",
            Self::ClearBuffer => "clear-buffer",
            Self::GetBuffer => "get-buffer",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys owned by the result envelope; handler data may not shadow them.
const RESERVED_KEYS: [&str; 3] = ["type", "success", "error"];

/// Reply to a [`DebugCommand`].
///
/// Command-specific fields sit beside the envelope fields on the wire:
///
/// ```json
/// { "type": "ping", "success": true, "sessionId": "…", "uptime": 1200 }
/// { "type": "query", "success": false, "error": "Engine not registered" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugCommandResult {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl DebugCommandResult {
    /// A successful result carrying `data`.
    ///
    /// Object data is spread into the result; any other JSON value is
    /// stored under `"value"`.
    pub fn ok(kind: CommandKind, data: Value) -> Self {
        let mut map = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        for key in RESERVED_KEYS {
            map.remove(key);
        }
        Self {
            kind,
            success: true,
            error: None,
            data: map,
        }
    }

    /// A failed result with a human-readable error.
    pub fn failure(kind: CommandKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            success: false,
            error: Some(error.into()),
            data: Map::new(),
        }
    }

    /// Look up a command-specific field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_names() {
        let cmd = DebugCommand::ListDocuments {
            prefix: Some("docs/".to_string()),
            limit: Some(10),
            offset: None,
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value, json!({"type": "list-documents", "prefix": "docs/", "limit": 10}));

        let ping: DebugCommand = serde_json::from_value(json!({"type": "ping"})).unwrap();
        assert_eq!(ping, DebugCommand::Ping);
    }

    #[test]
    fn test_query_defaults_top_k() {
        let cmd: DebugCommand =
            serde_json::from_value(json!({"type": "query", "query": "rust"})).unwrap();
        assert_eq!(cmd.kind(), CommandKind::Query);
        match cmd {
            DebugCommand::Query { top_k, scope, .. } => {
                assert_eq!(top_k, 8);
                assert!(scope.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_kind_names_match_serde() {
        for kind in CommandKind::ALL {
            let value = serde_json::to_value(kind).unwrap();
            assert_eq!(value.as_str(), Some(kind.as_str()));
        }
    }

    #[test]
    fn test_result_spreads_object_data() {
        let result = DebugCommandResult::ok(
            CommandKind::Ping,
            json!({"sessionId": "s", "uptime": 12, "success": false}),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["success"], true);
        assert_eq!(value["uptime"], 12);
        assert!(value.get("error").is_none());

        let back: DebugCommandResult = serde_json::from_value(value).unwrap();
        assert_eq!(back.get("sessionId"), Some(&json!("s")));
    }

    #[test]
    fn test_result_wraps_scalar_data() {
        let result = DebugCommandResult::ok(CommandKind::ClearBuffer, json!(4));
        assert_eq!(result.get("value"), Some(&json!(4)));
    }

    #[test]
    fn test_failure_shape() {
        let result = DebugCommandResult::failure(CommandKind::Query, "Not connected");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({"type": "query", "success": false, "error": "Not connected"})
        );
    }
}
