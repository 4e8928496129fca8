//! Command handlers and their registry.
//!
//! Every [`DebugCommand`] type maps to one [`CommandHandler`]. The server
//! looks the handler up by [`CommandKind`], awaits it, and turns whatever
//! happens into exactly one [`DebugCommandResult`]:
//!
//! | Outcome | Result |
//! |---------|--------|
//! | `Ok(data)` | `success: true`, object fields of `data` spread beside the envelope |
//! | `Err(e)` | `success: false`, `error` = the error chain |
//! | panic | `success: false`, `error` = the panic message |
//! | no handler | `success: false`, `error: "Unknown command: …"` |
//!
//! # Built-in handlers
//!
//! | Command | Needs | Data |
//! |---------|-------|------|
//! | `query` | engine | `chunks`, `durations` |
//! | `ingest` | engine | `documentId`, `chunkCount`, `embeddingModel`, `durations`, `warnings` |
//! | `list-documents` | store | `documents`, `total` |
//! | `get-document` | store | `document` |
//! | `delete-document` | store | `sourceId`, `deleted` |
//! | `delete-chunks` | store | `deletedCount` |
//! | `store-stats` | store | `documentCount`, `chunkCount`, … |
//! | `doctor` | none | `checks`, `capabilities`, `bus` (incl. `startedAt`), `eval`, `engine` |
//! | `run-eval` | `eval` capability + runner | `report` |
//! | `ping` | none | `sessionId`, `uptime` (ms) |
//! | `clear-buffer` | none | `cleared` |
//! | `get-buffer` | none | `events` |
//!
//! Custom handlers registered with [`HandlerRegistry::register`] replace the
//! built-in for the same kind.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::FutureExt;
use rag_debug_protocol::{
    compute_capabilities, Capability, CapabilityInputs, CommandKind, DebugCommand,
    DebugCommandResult, ServerInfo,
};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::bus::EventBus;
use crate::config::EvalConfig;
use crate::host::{
    EvalArgs, EvalRunner, IngestInput, ListDocumentsQuery, RagEngine, RetrieveRequest,
    StoreInspector,
};

// ═══════════════════════════════════════════════════════════════════════
// Context
// ═══════════════════════════════════════════════════════════════════════

/// Everything a handler may touch. Built once per server start.
pub struct HandlerContext {
    pub bus: Arc<EventBus>,
    pub engine: Option<Arc<dyn RagEngine>>,
    pub store: Option<Arc<dyn StoreInspector>>,
    pub eval: Option<Arc<dyn EvalRunner>>,
    pub eval_config: EvalConfig,
    pub server_info: Option<ServerInfo>,
    capabilities: Vec<Capability>,
}

impl HandlerContext {
    /// Build a context and compute its capability list from what is
    /// registered and whether the eval module exists on disk.
    pub fn new(
        bus: Arc<EventBus>,
        engine: Option<Arc<dyn RagEngine>>,
        store: Option<Arc<dyn StoreInspector>>,
        eval: Option<Arc<dyn EvalRunner>>,
        eval_config: EvalConfig,
        server_info: Option<ServerInfo>,
    ) -> Self {
        let capabilities = compute_capabilities(CapabilityInputs {
            engine: engine.is_some(),
            store_inspector: store.is_some(),
            eval_declared: eval_config.installed,
            eval_present: eval_config.is_present(),
        });
        Self {
            bus,
            engine,
            store,
            eval,
            eval_config,
            server_info,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn capability_names(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .map(|c| c.as_str().to_string())
            .collect()
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn engine(&self) -> Result<&Arc<dyn RagEngine>> {
        match &self.engine {
            Some(engine) => Ok(engine),
            None => bail!("Engine not registered"),
        }
    }

    fn store(&self) -> Result<&Arc<dyn StoreInspector>> {
        match &self.store {
            Some(store) => Ok(store),
            None => bail!("Store inspector not registered"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Handler trait
// ═══════════════════════════════════════════════════════════════════════

/// Executes one command type.
///
/// Returned data is spread into the result object; return a JSON object.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The command type this handler serves.
    fn kind(&self) -> CommandKind;

    async fn handle(&self, command: DebugCommand, ctx: &HandlerContext) -> Result<Value>;
}

fn mismatched(kind: CommandKind) -> anyhow::Error {
    anyhow::anyhow!("{} handler received a different command type", kind)
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in handlers
// ═══════════════════════════════════════════════════════════════════════

pub struct QueryHandler;

#[async_trait]
impl CommandHandler for QueryHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::Query
    }

    async fn handle(&self, command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        let DebugCommand::Query {
            query,
            top_k,
            scope,
        } = command
        else {
            return Err(mismatched(self.kind()));
        };
        if query.trim().is_empty() {
            bail!("query must not be empty");
        }

        let output = ctx
            .engine()?
            .retrieve(RetrieveRequest {
                query,
                top_k,
                scope,
            })
            .await?;
        Ok(serde_json::to_value(output)?)
    }
}

pub struct IngestHandler;

#[async_trait]
impl CommandHandler for IngestHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::Ingest
    }

    async fn handle(&self, command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        let DebugCommand::Ingest {
            source_id,
            content,
            metadata,
            chunking,
        } = command
        else {
            return Err(mismatched(self.kind()));
        };
        if source_id.trim().is_empty() {
            bail!("sourceId must not be empty");
        }

        let output = ctx
            .engine()?
            .ingest(IngestInput {
                source_id,
                content,
                metadata,
                chunking,
            })
            .await?;
        Ok(serde_json::to_value(output)?)
    }
}

pub struct ListDocumentsHandler;

#[async_trait]
impl CommandHandler for ListDocumentsHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ListDocuments
    }

    async fn handle(&self, command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        let DebugCommand::ListDocuments {
            prefix,
            limit,
            offset,
        } = command
        else {
            return Err(mismatched(self.kind()));
        };

        let page = ctx
            .store()?
            .list_documents(ListDocumentsQuery {
                prefix,
                limit,
                offset,
            })
            .await?;
        Ok(serde_json::to_value(page)?)
    }
}

pub struct GetDocumentHandler;

#[async_trait]
impl CommandHandler for GetDocumentHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::GetDocument
    }

    async fn handle(&self, command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        let DebugCommand::GetDocument { source_id } = command else {
            return Err(mismatched(self.kind()));
        };

        match ctx.store()?.get_document(&source_id).await? {
            Some(document) => Ok(json!({ "document": document })),
            None => bail!("Document not found: {}", source_id),
        }
    }
}

pub struct DeleteDocumentHandler;

#[async_trait]
impl CommandHandler for DeleteDocumentHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::DeleteDocument
    }

    async fn handle(&self, command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        let DebugCommand::DeleteDocument { source_id } = command else {
            return Err(mismatched(self.kind()));
        };

        let deleted = ctx.store()?.delete_document(&source_id).await?;
        Ok(json!({ "sourceId": source_id, "deleted": deleted }))
    }
}

pub struct DeleteChunksHandler;

#[async_trait]
impl CommandHandler for DeleteChunksHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::DeleteChunks
    }

    async fn handle(&self, command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        let DebugCommand::DeleteChunks { chunk_ids } = command else {
            return Err(mismatched(self.kind()));
        };

        let deleted = ctx.store()?.delete_chunks(&chunk_ids).await?;
        Ok(json!({ "deletedCount": deleted }))
    }
}

pub struct StoreStatsHandler;

#[async_trait]
impl CommandHandler for StoreStatsHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::StoreStats
    }

    async fn handle(&self, _command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        let stats = ctx.store()?.store_stats().await?;
        Ok(serde_json::to_value(stats)?)
    }
}

/// Reports what is registered and whether the optional pieces are usable.
pub struct DoctorHandler;

#[async_trait]
impl CommandHandler for DoctorHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::Doctor
    }

    async fn handle(&self, _command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        let eval_present = ctx.eval_config.is_present();
        let module_path = ctx.eval_config.module_path.display().to_string();

        let mut checks = vec![
            check(
                "bus",
                ctx.bus.enabled(),
                if ctx.bus.enabled() {
                    "instrumentation enabled".to_string()
                } else {
                    "instrumentation disabled".to_string()
                },
            ),
            check(
                "engine",
                ctx.engine.is_some(),
                if ctx.engine.is_some() {
                    "registered".to_string()
                } else {
                    "not registered; query and ingest are unavailable".to_string()
                },
            ),
            check(
                "storeInspector",
                ctx.store.is_some(),
                if ctx.store.is_some() {
                    "registered".to_string()
                } else {
                    "not registered; document commands are unavailable".to_string()
                },
            ),
        ];
        let eval_detail = match (ctx.eval_config.installed, eval_present) {
            (false, _) => "not installed".to_string(),
            (true, false) => format!("declared installed but {} is missing", module_path),
            (true, true) if ctx.eval.is_none() => {
                format!("module found at {} but no runner registered", module_path)
            }
            (true, true) => format!("module found at {}", module_path),
        };
        checks.push(check(
            "eval",
            ctx.has(Capability::Eval) && ctx.eval.is_some(),
            eval_detail,
        ));

        if let Some(store) = &ctx.store {
            match store.store_stats().await {
                Ok(stats) => checks.push(check(
                    "store",
                    true,
                    format!(
                        "{} documents, {} chunks",
                        stats.document_count, stats.chunk_count
                    ),
                )),
                Err(e) => checks.push(check("store", false, format!("{:#}", e))),
            }
        }

        Ok(json!({
            "checks": checks,
            "capabilities": ctx.capability_names(),
            "serverInfo": ctx.server_info,
            "bus": {
                "enabled": ctx.bus.enabled(),
                "sessionId": ctx.bus.session_id(),
                "startedAt": ctx.bus.started_at(),
                "buffered": ctx.bus.buffer_len(),
                "capacity": ctx.bus.capacity(),
                "subscribers": ctx.bus.subscriber_count(),
            },
            "eval": {
                "installed": ctx.eval_config.installed,
                "present": eval_present,
                "modulePath": module_path,
                "runner": ctx.eval.is_some(),
            },
            "engine": ctx.engine.as_ref().map(|e| e.debug_info()),
        }))
    }
}

fn check(name: &str, ok: bool, detail: String) -> Value {
    json!({
        "name": name,
        "status": if ok { "ok" } else { "warn" },
        "detail": detail,
    })
}

pub struct RunEvalHandler;

#[async_trait]
impl CommandHandler for RunEvalHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::RunEval
    }

    async fn handle(&self, command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        let DebugCommand::RunEval { dataset, options } = command else {
            return Err(mismatched(self.kind()));
        };
        if !ctx.has(Capability::Eval) {
            bail!(
                "Eval module not available (installed = {}, expected at {})",
                ctx.eval_config.installed,
                ctx.eval_config.module_path.display()
            );
        }
        let Some(runner) = &ctx.eval else {
            bail!("Eval runner not registered");
        };

        let report = runner.run_eval(EvalArgs { dataset, options }).await?;
        Ok(json!({ "report": report }))
    }
}

pub struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::Ping
    }

    async fn handle(&self, _command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        Ok(json!({
            "sessionId": ctx.bus.session_id(),
            "uptime": ctx.bus.uptime().as_millis() as u64,
        }))
    }
}

pub struct ClearBufferHandler;

#[async_trait]
impl CommandHandler for ClearBufferHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ClearBuffer
    }

    async fn handle(&self, _command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        Ok(json!({ "cleared": ctx.bus.clear_buffer() }))
    }
}

pub struct GetBufferHandler;

#[async_trait]
impl CommandHandler for GetBufferHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::GetBuffer
    }

    async fn handle(&self, _command: DebugCommand, ctx: &HandlerContext) -> Result<Value> {
        Ok(json!({ "events": ctx.bus.buffer() }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Maps command kinds to handlers.
///
/// # Example
///
/// ```rust
/// use rag_debug::handlers::HandlerRegistry;
///
/// let handlers = HandlerRegistry::with_builtins();
/// assert_eq!(handlers.len(), 12);
/// ```
pub struct HandlerRegistry {
    handlers: HashMap<CommandKind, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Create a registry with a built-in handler for every command type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(QueryHandler));
        registry.register(Arc::new(IngestHandler));
        registry.register(Arc::new(ListDocumentsHandler));
        registry.register(Arc::new(GetDocumentHandler));
        registry.register(Arc::new(DeleteDocumentHandler));
        registry.register(Arc::new(DeleteChunksHandler));
        registry.register(Arc::new(StoreStatsHandler));
        registry.register(Arc::new(DoctorHandler));
        registry.register(Arc::new(RunEvalHandler));
        registry.register(Arc::new(PingHandler));
        registry.register(Arc::new(ClearBufferHandler));
        registry.register(Arc::new(GetBufferHandler));
        registry
    }

    /// Register a handler, replacing any existing one for its kind.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn find(&self, kind: CommandKind) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Run `command` and convert every outcome into a result.
    pub async fn dispatch(&self, command: DebugCommand, ctx: &HandlerContext) -> DebugCommandResult {
        let kind = command.kind();
        let Some(handler) = self.find(kind) else {
            return DebugCommandResult::failure(kind, format!("Unknown command: {}", kind));
        };

        match AssertUnwindSafe(handler.handle(command, ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(data)) => DebugCommandResult::ok(kind, data),
            Ok(Err(e)) => DebugCommandResult::failure(kind, format!("{:#}", e)),
            Err(panic) => DebugCommandResult::failure(kind, panic_message(panic.as_ref())),
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "command handler panicked".to_string()
    }
}
