//! In-memory reference engine.
//!
//! [`MemoryEngine`] implements both [`RagEngine`] and [`StoreInspector`]
//! over a map of documents held in process memory. It exists so the debug
//! channel can be exercised end to end (`ragdbg serve --demo`, integration
//! tests) without a vector database.
//!
//! - **Chunking**: paragraphs (`\n\n`) are packed into chunks of at most
//!   `max_chunk_chars`; an oversized paragraph is split at the last space
//!   or newline before the limit. Every chunk carries a SHA-256 hash.
//! - **Scoring**: keyword overlap, the fraction of distinct query terms
//!   that appear in the chunk. There are no embeddings.
//! - **Instrumentation**: when constructed with a bus, every ingest,
//!   retrieve and delete emits its `*:start`, stage, `*:complete` (or
//!   `*:error`) events under one operation id.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rag_debug_protocol::EventPayload;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::bus::{new_op_id, EventBus};
use crate::host::{
    ChunkInfo, DeleteSelector, DocumentDetail, DocumentPage, DocumentSummary, Durations,
    IngestInput, IngestOutput, ListDocumentsQuery, RagEngine, RetrieveOutput, RetrieveRequest,
    RetrievedChunk, StoreInspector, StoreStats,
};

/// Default chunk size in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 800;

/// Reported as the embedding model; scoring is lexical.
const EMBEDDING_MODEL: &str = "none (keyword overlap)";

const DEFAULT_PAGE_SIZE: usize = 50;

struct StoredChunk {
    chunk_id: String,
    index: usize,
    text: String,
    hash: String,
    terms: HashSet<String>,
}

struct StoredDocument {
    document_id: String,
    source_id: String,
    content: String,
    metadata: Option<Value>,
    content_hash: String,
    updated_at: i64,
    chunks: Vec<StoredChunk>,
}

impl StoredDocument {
    fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            document_id: self.document_id.clone(),
            source_id: self.source_id.clone(),
            chunk_count: self.chunks.len(),
            content_length: self.content.len(),
            content_hash: self.content_hash.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Documents keyed by source id. See the [module docs](self).
pub struct MemoryEngine {
    bus: Option<Arc<EventBus>>,
    max_chunk_chars: usize,
    docs: RwLock<BTreeMap<String, StoredDocument>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            bus: None,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            docs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Emit instrumentation events on `bus`.
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    fn emit(&self, op_id: &str, payload: EventPayload) {
        if let Some(bus) = &self.bus {
            bus.emit(Some(op_id), payload);
        }
    }

    fn chunk_limit(&self, chunking: Option<&Value>) -> usize {
        chunking
            .and_then(|c| c.get("maxChars"))
            .and_then(Value::as_u64)
            .map(|n| (n as usize).max(1))
            .unwrap_or(self.max_chunk_chars)
    }

    fn remove_matching(&self, selector: &DeleteSelector) -> usize {
        let mut docs = self.docs.write();
        let before = docs.len();
        docs.retain(|source_id, doc| match selector {
            DeleteSelector::SourceId(id) => source_id != id,
            DeleteSelector::SourceIdPrefix(prefix) => !source_id.starts_with(prefix.as_str()),
            DeleteSelector::DocumentId(id) => &doc.document_id != id,
        });
        before - docs.len()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn sha256_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Split `text` into chunks of at most `max_chars` bytes, preferring
/// paragraph boundaries. Empty input yields no chunks.
pub fn chunk_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        let would_be = if current.is_empty() {
            para.len()
        } else {
            current.len() + 2 + para.len()
        };
        if would_be > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if para.len() > max_chars {
            let mut remaining = para;
            while !remaining.is_empty() {
                let cut = split_point(remaining, max_chars);
                let piece = remaining[..cut].trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
                remaining = remaining[cut..].trim_start();
            }
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Byte offset at which to cut `s` so the head fits in `max_chars`,
/// preferring the last whitespace. Always makes progress.
fn split_point(s: &str, max_chars: usize) -> usize {
    if s.len() <= max_chars {
        return s.len();
    }
    let mut limit = max_chars;
    while limit > 0 && !s.is_char_boundary(limit) {
        limit -= 1;
    }
    if limit == 0 {
        return s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len());
    }
    match s[..limit].rfind(['\n', ' ']) {
        Some(pos) if pos > 0 => pos + 1,
        _ => limit,
    }
}

#[async_trait]
impl RagEngine for MemoryEngine {
    async fn retrieve(&self, request: RetrieveRequest) -> Result<RetrieveOutput> {
        let op_id = new_op_id();
        let started = Instant::now();
        self.emit(
            &op_id,
            EventPayload::RetrieveStart {
                query: request.query.clone(),
                top_k: request.top_k,
                scope: request.scope.clone(),
            },
        );

        let query_terms = terms(&request.query);
        if query_terms.is_empty() {
            let error = "query has no searchable terms".to_string();
            self.emit(
                &op_id,
                EventPayload::RetrieveError {
                    query: request.query.clone(),
                    error: error.clone(),
                },
            );
            bail!(error);
        }
        let embed_ms = elapsed_ms(started);
        self.emit(
            &op_id,
            EventPayload::RetrieveEmbeddingComplete {
                query: request.query.clone(),
                duration_ms: embed_ms,
            },
        );

        let prefix = request
            .scope
            .as_ref()
            .and_then(|s| s.get("sourceIdPrefix"))
            .and_then(Value::as_str);

        let search_started = Instant::now();
        let mut scored: Vec<(f64, usize, RetrievedChunk)> = Vec::new();
        {
            let docs = self.docs.read();
            for doc in docs.values() {
                if prefix.is_some_and(|p| !doc.source_id.starts_with(p)) {
                    continue;
                }
                for chunk in &doc.chunks {
                    let hits = query_terms
                        .iter()
                        .filter(|t| chunk.terms.contains(t.as_str()))
                        .count();
                    if hits == 0 {
                        continue;
                    }
                    let score = hits as f64 / query_terms.len() as f64;
                    scored.push((
                        score,
                        chunk.index,
                        RetrievedChunk {
                            chunk_id: chunk.chunk_id.clone(),
                            document_id: doc.document_id.clone(),
                            source_id: doc.source_id.clone(),
                            text: chunk.text.clone(),
                            score,
                        },
                    ));
                }
            }
        }
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.2.source_id.cmp(&b.2.source_id))
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.truncate(request.top_k);
        let chunks: Vec<RetrievedChunk> = scored.into_iter().map(|(_, _, c)| c).collect();

        let search_ms = elapsed_ms(search_started);
        self.emit(
            &op_id,
            EventPayload::RetrieveDatabaseComplete {
                query: request.query.clone(),
                results_count: chunks.len(),
                duration_ms: search_ms,
            },
        );
        let total_ms = elapsed_ms(started);
        self.emit(
            &op_id,
            EventPayload::RetrieveComplete {
                query: request.query,
                results_count: chunks.len(),
                total_duration_ms: total_ms,
            },
        );

        let mut durations = Durations::new();
        durations.insert("embedding".to_string(), embed_ms);
        durations.insert("search".to_string(), search_ms);
        durations.insert("total".to_string(), total_ms);
        Ok(RetrieveOutput { chunks, durations })
    }

    async fn ingest(&self, input: IngestInput) -> Result<IngestOutput> {
        let op_id = new_op_id();
        let started = Instant::now();
        self.emit(
            &op_id,
            EventPayload::IngestStart {
                source_id: input.source_id.clone(),
                content_length: input.content.len(),
                metadata: input.metadata.clone(),
            },
        );

        let max_chars = self.chunk_limit(input.chunking.as_ref());
        let pieces = chunk_paragraphs(&input.content, max_chars);
        if pieces.is_empty() {
            let error = format!("{} has no content to index", input.source_id);
            self.emit(
                &op_id,
                EventPayload::IngestError {
                    source_id: input.source_id.clone(),
                    error: error.clone(),
                },
            );
            bail!(error);
        }
        let chunk_ms = elapsed_ms(started);
        self.emit(
            &op_id,
            EventPayload::IngestChunkingComplete {
                source_id: input.source_id.clone(),
                chunk_count: pieces.len(),
                duration_ms: chunk_ms,
            },
        );

        let embed_started = Instant::now();
        let chunks: Vec<StoredChunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(index, text)| StoredChunk {
                chunk_id: Uuid::new_v4().to_string(),
                index,
                hash: sha256_hex(&text),
                terms: terms(&text),
                text,
            })
            .collect();
        let embed_ms = elapsed_ms(embed_started);
        self.emit(
            &op_id,
            EventPayload::IngestEmbeddingComplete {
                source_id: input.source_id.clone(),
                chunk_count: chunks.len(),
                embedding_model: EMBEDDING_MODEL.to_string(),
                duration_ms: embed_ms,
            },
        );

        let mut warnings = Vec::new();
        if let Some(chunking) = &input.chunking {
            if chunking.get("maxChars").is_none() {
                warnings.push("chunking options other than maxChars are ignored".to_string());
            }
        }

        let store_started = Instant::now();
        let chunk_count = chunks.len();
        let document_id = {
            let mut docs = self.docs.write();
            let document_id = match docs.get(&input.source_id) {
                Some(existing) => {
                    warnings.push(format!(
                        "replaced {} existing chunks for {}",
                        existing.chunks.len(),
                        input.source_id
                    ));
                    existing.document_id.clone()
                }
                None => Uuid::new_v4().to_string(),
            };
            docs.insert(
                input.source_id.clone(),
                StoredDocument {
                    document_id: document_id.clone(),
                    source_id: input.source_id.clone(),
                    content_hash: sha256_hex(&input.content),
                    content: input.content,
                    metadata: input.metadata,
                    updated_at: Utc::now().timestamp_millis(),
                    chunks,
                },
            );
            document_id
        };
        let store_ms = elapsed_ms(store_started);
        self.emit(
            &op_id,
            EventPayload::IngestStorageComplete {
                source_id: input.source_id.clone(),
                document_id: document_id.clone(),
                duration_ms: store_ms,
            },
        );

        let total_ms = elapsed_ms(started);
        self.emit(
            &op_id,
            EventPayload::IngestComplete {
                source_id: input.source_id,
                document_id: document_id.clone(),
                chunk_count,
                total_duration_ms: total_ms,
                warnings: warnings.clone(),
            },
        );

        let mut durations = Durations::new();
        durations.insert("chunking".to_string(), chunk_ms);
        durations.insert("embedding".to_string(), embed_ms);
        durations.insert("storage".to_string(), store_ms);
        durations.insert("total".to_string(), total_ms);
        Ok(IngestOutput {
            document_id,
            chunk_count,
            embedding_model: EMBEDDING_MODEL.to_string(),
            durations,
            warnings,
        })
    }

    async fn delete(&self, selector: &DeleteSelector) -> Result<usize> {
        let op_id = new_op_id();
        let started = Instant::now();
        let selector_value = selector.to_value();
        self.emit(
            &op_id,
            EventPayload::DeleteStart {
                selector: selector_value.clone(),
            },
        );

        if let DeleteSelector::SourceIdPrefix(prefix) = selector {
            if prefix.is_empty() {
                let error = "refusing to delete with an empty prefix".to_string();
                self.emit(
                    &op_id,
                    EventPayload::DeleteError {
                        selector: selector_value,
                        error: error.clone(),
                    },
                );
                bail!(error);
            }
        }

        let deleted = self.remove_matching(selector);
        self.emit(
            &op_id,
            EventPayload::DeleteComplete {
                selector: selector_value,
                deleted_count: deleted,
                duration_ms: elapsed_ms(started),
            },
        );
        Ok(deleted)
    }

    fn debug_info(&self) -> Value {
        json!({
            "engine": "memory",
            "scoring": "keyword-overlap",
            "embeddingModel": EMBEDDING_MODEL,
            "maxChunkChars": self.max_chunk_chars,
            "documents": self.len(),
            "instrumented": self.bus.is_some(),
        })
    }
}

#[async_trait]
impl StoreInspector for MemoryEngine {
    async fn list_documents(&self, query: ListDocumentsQuery) -> Result<DocumentPage> {
        let docs = self.docs.read();
        let matching: Vec<&StoredDocument> = docs
            .values()
            .filter(|d| {
                query
                    .prefix
                    .as_deref()
                    .map_or(true, |p| d.source_id.starts_with(p))
            })
            .collect();
        let total = matching.len();
        let documents = matching
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .map(StoredDocument::summary)
            .collect();
        Ok(DocumentPage { documents, total })
    }

    async fn get_document(&self, source_id: &str) -> Result<Option<DocumentDetail>> {
        let docs = self.docs.read();
        Ok(docs.get(source_id).map(|doc| DocumentDetail {
            summary: doc.summary(),
            content: doc.content.clone(),
            metadata: doc.metadata.clone(),
            chunks: doc
                .chunks
                .iter()
                .map(|c| ChunkInfo {
                    chunk_id: c.chunk_id.clone(),
                    index: c.index,
                    text: c.text.clone(),
                    hash: c.hash.clone(),
                })
                .collect(),
        }))
    }

    async fn delete_document(&self, source_id: &str) -> Result<bool> {
        let deleted = self
            .delete(&DeleteSelector::SourceId(source_id.to_string()))
            .await?;
        Ok(deleted > 0)
    }

    async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<usize> {
        let wanted: HashSet<&str> = chunk_ids.iter().map(String::as_str).collect();
        let mut docs = self.docs.write();
        let mut deleted = 0;
        for doc in docs.values_mut() {
            let before = doc.chunks.len();
            doc.chunks.retain(|c| !wanted.contains(c.chunk_id.as_str()));
            deleted += before - doc.chunks.len();
        }
        Ok(deleted)
    }

    async fn store_stats(&self) -> Result<StoreStats> {
        let docs = self.docs.read();
        Ok(StoreStats {
            document_count: docs.len(),
            chunk_count: docs.values().map(|d| d.chunks.len()).sum(),
            total_content_bytes: docs.values().map(|d| d.content.len()).sum(),
            embedding_model: Some(EMBEDDING_MODEL.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_debug_protocol::DebugEvent;

    fn input(source_id: &str, content: &str) -> IngestInput {
        IngestInput {
            source_id: source_id.to_string(),
            content: content.to_string(),
            metadata: None,
            chunking: None,
        }
    }

    fn retrieve(query: &str, top_k: usize) -> RetrieveRequest {
        RetrieveRequest {
            query: query.to_string(),
            top_k,
            scope: None,
        }
    }

    #[test]
    fn test_chunk_paragraphs_packs_until_limit() {
        let chunks = chunk_paragraphs("aaaa\n\nbbbb\n\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn test_chunk_paragraphs_hard_splits_on_space() {
        let chunks = chunk_paragraphs("one two three four", 9);
        assert_eq!(chunks, vec!["one two", "three", "four"]);
    }

    #[test]
    fn test_chunk_paragraphs_multibyte_safe() {
        let chunks = chunk_paragraphs("ééééé", 3);
        assert_eq!(chunks.concat(), "ééééé");
    }

    #[test]
    fn test_chunk_paragraphs_empty() {
        assert!(chunk_paragraphs("  \n\n  ", 10).is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_term_overlap() {
        let engine = MemoryEngine::new();
        engine
            .ingest(input("a.md", "rust async runtime\n\ncooking pasta"))
            .await
            .unwrap();
        engine.ingest(input("b.md", "rust borrow checker")).await.unwrap();

        let out = engine.retrieve(retrieve("rust async", 5)).await.unwrap();
        assert_eq!(out.chunks[0].source_id, "a.md");
        assert_eq!(out.chunks[0].score, 1.0);
        assert_eq!(out.chunks.len(), 2);
        assert!(out.durations.contains_key("total"));

        let out = engine.retrieve(retrieve("rust", 1)).await.unwrap();
        assert_eq!(out.chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_reingest_keeps_document_id() {
        let engine = MemoryEngine::new();
        let first = engine.ingest(input("a.md", "v1")).await.unwrap();
        let second = engine.ingest(input("a.md", "v2")).await.unwrap();
        assert_eq!(first.document_id, second.document_id);
        assert_eq!(second.warnings.len(), 1);
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_content_is_error() {
        let engine = MemoryEngine::new();
        assert!(engine.ingest(input("a.md", "   ")).await.is_err());
        assert!(engine.is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_prefix_and_chunks() {
        let engine = MemoryEngine::new();
        engine.ingest(input("docs/a.md", "alpha")).await.unwrap();
        engine.ingest(input("docs/b.md", "beta")).await.unwrap();
        engine.ingest(input("notes/c.md", "gamma\n\ndelta")).await.unwrap();

        let deleted = engine
            .delete(&DeleteSelector::SourceIdPrefix("docs/".into()))
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let detail = engine.get_document("notes/c.md").await.unwrap().unwrap();
        assert_eq!(detail.chunks.len(), 1);
        let ids = vec![detail.chunks[0].chunk_id.clone(), "missing".to_string()];
        assert_eq!(engine.delete_chunks(&ids).await.unwrap(), 1);

        let stats = engine.store_stats().await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 0);
    }

    #[tokio::test]
    async fn test_list_documents_paginates() {
        let engine = MemoryEngine::new();
        for name in ["a", "b", "c"] {
            engine.ingest(input(&format!("docs/{}.md", name), name)).await.unwrap();
        }
        let page = engine
            .list_documents(ListDocumentsQuery {
                prefix: Some("docs/".into()),
                limit: Some(2),
                offset: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        let ids: Vec<_> = page.documents.iter().map(|d| d.source_id.as_str()).collect();
        assert_eq!(ids, vec!["docs/b.md", "docs/c.md"]);
    }

    #[tokio::test]
    async fn test_ingest_emits_correlated_events() {
        let bus = Arc::new(EventBus::new(100));
        let engine = MemoryEngine::new().with_bus(bus.clone());
        engine.ingest(input("a.md", "hello world")).await.unwrap();

        let events: Vec<DebugEvent> = bus.buffer();
        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                "ingest:start",
                "ingest:chunking-complete",
                "ingest:embedding-complete",
                "ingest:storage-complete",
                "ingest:complete",
            ]
        );
        let op = events[0].op_id.clone();
        assert!(op.is_some());
        assert!(events.iter().all(|e| e.op_id == op));
    }

    #[tokio::test]
    async fn test_retrieve_error_event() {
        let bus = Arc::new(EventBus::new(100));
        let engine = MemoryEngine::new().with_bus(bus.clone());
        assert!(engine.retrieve(retrieve("   ", 3)).await.is_err());
        let last = bus.buffer().pop().unwrap();
        assert_eq!(last.event_type(), "retrieve:error");
    }
}
