//! Collaborator interfaces the host application registers with the server.
//!
//! The debug channel does not know how retrieval, storage, or evaluation
//! work. Command handlers reach them only through these traits:
//!
//! | Trait | Backs commands | Capability |
//! |-------|----------------|------------|
//! | [`RagEngine`] | `query`, `ingest`, `doctor` | `query` |
//! | [`StoreInspector`] | `list-documents`, `get-document`, `delete-document`, `delete-chunks`, `store-stats` | `docs`, `storeInspector` |
//! | [`EvalRunner`] | `run-eval` | `eval` |
//!
//! Implementations may be called concurrently from several in-flight
//! commands; any consistency they need is theirs to provide.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-stage timings in milliseconds, keyed by stage name.
pub type Durations = BTreeMap<String, f64>;

// ═══════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════

/// Input to [`RagEngine::retrieve`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveRequest {
    pub query: String,
    pub top_k: usize,
    pub scope: Option<Value>,
}

/// One chunk returned by a retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_id: String,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveOutput {
    pub chunks: Vec<RetrievedChunk>,
    pub durations: Durations,
}

/// Input to [`RagEngine::ingest`].
#[derive(Debug, Clone, PartialEq)]
pub struct IngestInput {
    pub source_id: String,
    pub content: String,
    pub metadata: Option<Value>,
    /// Engine-specific chunking overrides.
    pub chunking: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutput {
    pub document_id: String,
    pub chunk_count: usize,
    pub embedding_model: String,
    pub durations: Durations,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Which documents a delete applies to.
///
/// Serialized externally tagged, e.g. `{"sourceId":"docs/a.md"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteSelector {
    SourceId(String),
    SourceIdPrefix(String),
    DocumentId(String),
}

impl DeleteSelector {
    /// JSON form used in `delete:*` events.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A retrieval engine: ingest documents, retrieve chunks, delete.
#[async_trait]
pub trait RagEngine: Send + Sync {
    async fn retrieve(&self, request: RetrieveRequest) -> Result<RetrieveOutput>;

    async fn ingest(&self, input: IngestInput) -> Result<IngestOutput>;

    /// Delete matching documents and their chunks; returns how many
    /// documents were removed.
    async fn delete(&self, selector: &DeleteSelector) -> Result<usize>;

    /// Summary of the engine's configuration, shown by `doctor`.
    fn debug_info(&self) -> Value {
        Value::Null
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Store inspector
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListDocumentsQuery {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub document_id: String,
    pub source_id: String,
    pub chunk_count: usize,
    pub content_length: usize,
    pub content_hash: String,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub documents: Vec<DocumentSummary>,
    /// Matching documents before pagination.
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    pub chunk_id: String,
    pub index: usize,
    pub text: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub summary: DocumentSummary,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub chunks: Vec<ChunkInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub total_content_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

/// Read and maintenance access to the backing store.
#[async_trait]
pub trait StoreInspector: Send + Sync {
    async fn list_documents(&self, query: ListDocumentsQuery) -> Result<DocumentPage>;

    async fn get_document(&self, source_id: &str) -> Result<Option<DocumentDetail>>;

    /// Returns `false` when no document had `source_id`.
    async fn delete_document(&self, source_id: &str) -> Result<bool>;

    /// Returns how many of `chunk_ids` existed and were removed.
    async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<usize>;

    async fn store_stats(&self) -> Result<StoreStats>;
}

// ═══════════════════════════════════════════════════════════════════════
// Eval
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct EvalArgs {
    pub dataset: String,
    pub options: Option<Value>,
}

/// The optional evaluation module.
///
/// Only consulted when `[eval] installed = true` and the module path
/// exists; otherwise `run-eval` fails without calling it.
#[async_trait]
pub trait EvalRunner: Send + Sync {
    /// Run an evaluation and return its report.
    async fn run_eval(&self, args: EvalArgs) -> Result<Value>;
}
