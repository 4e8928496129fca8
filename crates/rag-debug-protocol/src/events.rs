//! Instrumentation events emitted by the host application.
//!
//! Every event shares a small envelope (`timestamp`, `sessionId`, optional
//! `opId`) and carries one [`EventPayload`] variant, discriminated on the
//! wire by its `type` field:
//!
//! ```json
//! {
//!   "type": "ingest:chunking-complete",
//!   "timestamp": 1760000000000,
//!   "sessionId": "4f0c…",
//!   "opId": "op-7",
//!   "sourceId": "docs/readme.md",
//!   "chunkCount": 4,
//!   "durationMs": 1.2
//! }
//! ```
//!
//! Events with the same `opId` belong to one logical operation (one ingest
//! call, one retrieval).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single recorded instrumentation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugEvent {
    /// Milliseconds since the Unix epoch at which the event was recorded.
    pub timestamp: i64,
    /// Session of the bus that recorded the event.
    pub session_id: String,
    /// Correlates events belonging to one logical operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_id: Option<String>,
    /// Event-specific fields, including the `type` discriminant.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl DebugEvent {
    /// The wire discriminant of this event (e.g. `"retrieve:complete"`).
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

/// Event-specific payload for each operation family.
///
/// Each of the ingest, retrieve, rerank, and delete families has a start
/// event, zero or more stage completions, a completion, and an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum EventPayload {
    #[serde(rename = "ingest:start")]
    IngestStart {
        source_id: String,
        content_length: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    #[serde(rename = "ingest:chunking-complete")]
    IngestChunkingComplete {
        source_id: String,
        chunk_count: usize,
        duration_ms: f64,
    },
    #[serde(rename = "ingest:embedding-complete")]
    IngestEmbeddingComplete {
        source_id: String,
        chunk_count: usize,
        embedding_model: String,
        duration_ms: f64,
    },
    #[serde(rename = "ingest:storage-complete")]
    IngestStorageComplete {
        source_id: String,
        document_id: String,
        duration_ms: f64,
    },
    #[serde(rename = "ingest:complete")]
    IngestComplete {
        source_id: String,
        document_id: String,
        chunk_count: usize,
        total_duration_ms: f64,
        #[serde(default)]
        warnings: Vec<String>,
    },
    #[serde(rename = "ingest:error")]
    IngestError { source_id: String, error: String },

    #[serde(rename = "retrieve:start")]
    RetrieveStart {
        query: String,
        top_k: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<Value>,
    },
    #[serde(rename = "retrieve:embedding-complete")]
    RetrieveEmbeddingComplete { query: String, duration_ms: f64 },
    #[serde(rename = "retrieve:database-complete")]
    RetrieveDatabaseComplete {
        query: String,
        results_count: usize,
        duration_ms: f64,
    },
    #[serde(rename = "retrieve:complete")]
    RetrieveComplete {
        query: String,
        results_count: usize,
        total_duration_ms: f64,
    },
    #[serde(rename = "retrieve:error")]
    RetrieveError { query: String, error: String },

    #[serde(rename = "rerank:start")]
    RerankStart {
        query: String,
        candidate_count: usize,
        reranker: String,
    },
    #[serde(rename = "rerank:scoring-complete")]
    RerankScoringComplete { query: String, duration_ms: f64 },
    #[serde(rename = "rerank:complete")]
    RerankComplete {
        query: String,
        input_count: usize,
        output_count: usize,
        total_duration_ms: f64,
    },
    #[serde(rename = "rerank:error")]
    RerankError { query: String, error: String },

    #[serde(rename = "delete:start")]
    DeleteStart { selector: Value },
    #[serde(rename = "delete:complete")]
    DeleteComplete {
        selector: Value,
        deleted_count: usize,
        duration_ms: f64,
    },
    #[serde(rename = "delete:error")]
    DeleteError { selector: Value, error: String },
}

impl EventPayload {
    /// The wire discriminant of this payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::IngestStart { .. } => "ingest:start",
            Self::IngestChunkingComplete { .. } => "ingest:chunking-complete",
            Self::IngestEmbeddingComplete { .. } => "ingest:embedding-complete",
            Self::IngestStorageComplete { .. } => "ingest:storage-complete",
            Self::IngestComplete { .. } => "ingest:complete",
            Self::IngestError { .. } => "ingest:error",
            Self::RetrieveStart { .. } => "retrieve:start",
            Self::RetrieveEmbeddingComplete { .. } => "retrieve:embedding-complete",
            Self::RetrieveDatabaseComplete { .. } => "retrieve:database-complete",
            Self::RetrieveComplete { .. } => "retrieve:complete",
            Self::RetrieveError { .. } => "retrieve:error",
            Self::RerankStart { .. } => "rerank:start",
            Self::RerankScoringComplete { .. } => "rerank:scoring-complete",
            Self::RerankComplete { .. } => "rerank:complete",
            Self::RerankError { .. } => "rerank:error",
            Self::DeleteStart { .. } => "delete:start",
            Self::DeleteComplete { .. } => "delete:complete",
            Self::DeleteError { .. } => "delete:error",
        }
    }

    /// Operation family: `"ingest"`, `"retrieve"`, `"rerank"`, or `"delete"`.
    pub fn family(&self) -> &'static str {
        let ty = self.event_type();
        ty.split_once(':').map(|(family, _)| family).unwrap_or(ty)
    }

    /// Whether this payload reports a failed operation.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::IngestError { .. }
                | Self::RetrieveError { .. }
                | Self::RerankError { .. }
                | Self::DeleteError { .. }
        )
    }
}
