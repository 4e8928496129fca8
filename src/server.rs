//! Embedded debug server.
//!
//! Hosts the debug channel inside the application: accepts inspector
//! sockets through the selected [`Transport`](crate::transport::Transport),
//! runs the per-connection handshake, replays and broadcasts bus events,
//! and dispatches commands to the [`HandlerRegistry`].
//!
//! # Handshake
//!
//! ```text
//!  open ──▶ hello sent ──▶ awaiting client hello
//!                              │
//!       ┌──────────────────────┼───────────────────────────┐
//!       ▼                      ▼                           ▼
//!  hello, version ok     hello, version unknown     timeout / command first
//!  welcome (once)        error protocol_mismatch    legacy: welcome (once)
//!  ─▶ active             close 1002                 strict: error handshake_required,
//!                                                           close 1002
//! ```
//!
//! A connection over `max_clients` is closed with 1013 before any of this.
//!
//! # Ordering
//!
//! All connection state lives in one event-loop task. The welcome records
//! the bus sequence number of its replay; live events at or below it are
//! skipped for that connection, so replay always precedes live events and
//! nothing is delivered twice.
//!
//! Command handlers run in their own tasks, so results may arrive in any
//! order; each carries its `requestId`.

use rag_debug_protocol::{
    decode_client_message, ClientMessage, DebugCommand, ServerInfo, ServerMessage,
    CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR, CLOSE_TRY_AGAIN_LATER, PROTOCOL_VERSION,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, SequencedEvent};
use crate::config::{EvalConfig, ServerConfig};
use crate::handlers::{HandlerContext, HandlerRegistry};
use crate::host::{EvalRunner, RagEngine, StoreInspector};
use crate::subscribers::Subscription;
use crate::transport::{select_transport, ConnId, Connection, TransportError, TransportEvent};

/// How long `stop()` waits for the accept loop to wind down.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Errors raised by [`DebugServer::start`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(
        "the debug bus is disabled; set `[bus] enabled = true` or RAG_DEBUG=1 \
         before starting the debug server"
    )]
    BusDisabled,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Builder for the debug server.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> anyhow::Result<()> {
/// use std::sync::Arc;
/// use rag_debug::bus::EventBus;
/// use rag_debug::config::ServerConfig;
/// use rag_debug::server::DebugServer;
///
/// let bus = Arc::new(EventBus::default());
/// let handle = DebugServer::new(bus, ServerConfig::default()).start().await?;
/// println!("inspect at {}", handle.endpoint());
/// handle.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct DebugServer {
    bus: Arc<EventBus>,
    config: ServerConfig,
    eval_config: EvalConfig,
    engine: Option<Arc<dyn RagEngine>>,
    store: Option<Arc<dyn StoreInspector>>,
    eval: Option<Arc<dyn EvalRunner>>,
    handlers: HandlerRegistry,
}

impl DebugServer {
    pub fn new(bus: Arc<EventBus>, config: ServerConfig) -> Self {
        Self {
            bus,
            config,
            eval_config: EvalConfig::default(),
            engine: None,
            store: None,
            eval: None,
            handlers: HandlerRegistry::with_builtins(),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn RagEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StoreInspector>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_eval_runner(mut self, runner: Arc<dyn EvalRunner>) -> Self {
        self.eval = Some(runner);
        self
    }

    pub fn with_eval_config(mut self, eval_config: EvalConfig) -> Self {
        self.eval_config = eval_config;
        self
    }

    /// Replace the built-in handler set.
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Bind the listening socket and start serving.
    ///
    /// Fails without side effects when the bus is disabled or no socket
    /// stack is usable; the call may simply be retried.
    pub async fn start(self) -> Result<DebugServerHandle, ServerError> {
        if !self.bus.enabled() {
            return Err(ServerError::BusDisabled);
        }

        let transport = select_transport(self.config.transport)?;
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let bound = transport
            .bind(&self.config.bind_addr(), transport_tx, shutdown.child_token())
            .await?;

        let endpoint = self.config.endpoint(bound.local_addr.port());
        let server_info = ServerInfo {
            endpoint: endpoint.clone(),
            pid: std::process::id(),
            runtime: format!("rust/tokio ({})", transport.name()),
        };
        let ctx = Arc::new(HandlerContext::new(
            self.bus.clone(),
            self.engine,
            self.store,
            self.eval,
            self.eval_config,
            Some(server_info.clone()),
        ));

        let (bus_tx, bus_rx) = mpsc::unbounded_channel::<SequencedEvent>();
        let subscription = self.bus.subscribe(move |event: &SequencedEvent| {
            let _ = bus_tx.send(event.clone());
        });

        let client_count = Arc::new(AtomicUsize::new(0));
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let event_loop = EventLoop {
            bus: self.bus.clone(),
            max_clients: self.config.max_clients,
            handshake_timeout: self.config.handshake_timeout(),
            legacy_handshake: self.config.legacy_handshake,
            capabilities: ctx.capability_names(),
            server_info,
            ctx,
            handlers: Arc::new(self.handlers),
            slots: HashMap::new(),
            client_count: client_count.clone(),
            timer_tx,
        };
        let loop_task = tokio::spawn(event_loop.run(
            transport_rx,
            bus_rx,
            timer_rx,
            shutdown.clone(),
        ));

        info!(
            endpoint = %endpoint,
            transport = transport.name(),
            max_clients = self.config.max_clients,
            "debug server listening"
        );

        Ok(DebugServerHandle {
            local_addr: bound.local_addr,
            endpoint,
            client_count,
            shutdown,
            subscription,
            loop_task: Some(loop_task),
            accept_task: Some(bound.task),
        })
    }
}

/// A running debug server. Dropping it stops accepting and closes clients
/// without waiting; prefer [`stop`](DebugServerHandle::stop).
pub struct DebugServerHandle {
    local_addr: SocketAddr,
    endpoint: String,
    client_count: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    subscription: Subscription,
    loop_task: Option<JoinHandle<()>>,
    accept_task: Option<JoinHandle<()>>,
}

impl DebugServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://host:port` as advertised in the server hello.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Registered connections, including ones still in the handshake.
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::SeqCst)
    }

    /// Unsubscribe from the bus, close every client with 1000, and stop
    /// accepting connections.
    pub async fn stop(mut self) {
        self.subscription.unsubscribe();
        self.shutdown.cancel();
        if let Some(task) = self.loop_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.accept_task.take() {
            if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
                warn!("accept loop did not finish within {:?}", STOP_GRACE);
            }
        }
        info!(endpoint = %self.endpoint, "debug server stopped");
    }
}

impl Drop for DebugServerHandle {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
        self.shutdown.cancel();
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Event loop
// ═══════════════════════════════════════════════════════════════════════

struct ClientSlot {
    conn: Connection,
    hello_received: bool,
    welcome_sent: bool,
    /// Bus sequence covered by this client's welcome replay.
    replayed_through: u64,
    handshake_timer: Option<AbortHandle>,
}

impl ClientSlot {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.handshake_timer.take() {
            timer.abort();
        }
    }
}

struct EventLoop {
    bus: Arc<EventBus>,
    max_clients: usize,
    handshake_timeout: Duration,
    legacy_handshake: bool,
    capabilities: Vec<String>,
    server_info: ServerInfo,
    ctx: Arc<HandlerContext>,
    handlers: Arc<HandlerRegistry>,
    slots: HashMap<ConnId, ClientSlot>,
    client_count: Arc<AtomicUsize>,
    timer_tx: mpsc::UnboundedSender<ConnId>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        mut bus_rx: mpsc::UnboundedReceiver<SequencedEvent>,
        mut timer_rx: mpsc::UnboundedReceiver<ConnId>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(event) = transport_rx.recv() => self.on_transport_event(event),
                Some(event) = bus_rx.recv() => self.broadcast(&event),
                Some(conn_id) = timer_rx.recv() => self.on_handshake_timeout(conn_id),
                else => break,
            }
        }

        for (_, mut slot) in self.slots.drain() {
            slot.cancel_timer();
            slot.conn.close(CLOSE_NORMAL, "Server shutting down");
        }
        // Sockets upgraded just before shutdown are still queued here.
        transport_rx.close();
        while let Ok(event) = transport_rx.try_recv() {
            if let TransportEvent::Open(conn) = event {
                conn.close(CLOSE_NORMAL, "Server shutting down");
            }
        }
        self.client_count.store(0, Ordering::SeqCst);
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open(conn) => self.on_open(conn),
            TransportEvent::Message { conn, text } => self.on_message(conn, &text),
            TransportEvent::Close { conn } => {
                if self.remove_slot(conn) {
                    debug!(conn_id = conn, clients = self.slots.len(), "client disconnected");
                }
            }
        }
    }

    fn on_open(&mut self, conn: Connection) {
        if self.slots.len() >= self.max_clients {
            debug!(
                conn_id = conn.id(),
                max_clients = self.max_clients,
                "rejecting connection at capacity"
            );
            conn.close(CLOSE_TRY_AGAIN_LATER, "Maximum clients reached");
            return;
        }

        let id = conn.id();
        send_message(
            &conn,
            &ServerMessage::Hello {
                protocol_version: PROTOCOL_VERSION,
                capabilities: self.capabilities.clone(),
                server_info: Some(self.server_info.clone()),
            },
        );

        let timer_tx = self.timer_tx.clone();
        let timeout = self.handshake_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = timer_tx.send(id);
        });

        debug!(conn_id = id, peer = ?conn.peer(), "client connected");
        self.slots.insert(
            id,
            ClientSlot {
                conn,
                hello_received: false,
                welcome_sent: false,
                replayed_through: 0,
                handshake_timer: Some(timer.abort_handle()),
            },
        );
        self.client_count.store(self.slots.len(), Ordering::SeqCst);
    }

    fn on_message(&mut self, conn_id: ConnId, text: &str) {
        if !self.slots.contains_key(&conn_id) {
            return;
        }
        match decode_client_message(text) {
            Some(ClientMessage::Hello {
                supported_protocol_versions,
                ..
            }) => self.on_client_hello(conn_id, &supported_protocol_versions),
            Some(ClientMessage::Command {
                request_id,
                command,
            }) => self.on_command(conn_id, request_id, command),
            None => debug!(conn_id, "dropping malformed client message"),
        }
    }

    fn on_client_hello(&mut self, conn_id: ConnId, versions: &[u32]) {
        let Some(slot) = self.slots.get_mut(&conn_id) else {
            return;
        };
        slot.hello_received = true;
        slot.cancel_timer();

        if !versions.contains(&PROTOCOL_VERSION) {
            warn!(
                conn_id,
                server_version = PROTOCOL_VERSION,
                client_versions = ?versions,
                "protocol version mismatch"
            );
            send_message(
                &slot.conn,
                &ServerMessage::Error {
                    code: "protocol_mismatch".to_string(),
                    message: format!(
                        "Protocol version mismatch: server speaks version {}, client supports {:?}",
                        PROTOCOL_VERSION, versions
                    ),
                    details: Some(json!({
                        "serverVersion": PROTOCOL_VERSION,
                        "clientVersions": versions,
                    })),
                },
            );
            slot.conn
                .close(CLOSE_PROTOCOL_ERROR, "Protocol version mismatch");
            self.remove_slot(conn_id);
            return;
        }

        if !slot.welcome_sent {
            send_welcome(&self.bus, slot);
        }
    }

    fn on_command(&mut self, conn_id: ConnId, request_id: String, command: DebugCommand) {
        let Some(slot) = self.slots.get_mut(&conn_id) else {
            return;
        };

        if !slot.welcome_sent {
            if !self.legacy_handshake {
                reject_without_handshake(slot);
                self.remove_slot(conn_id);
                return;
            }
            debug!(conn_id, "command before hello; completing handshake implicitly");
            slot.cancel_timer();
            send_welcome(&self.bus, slot);
        }

        let kind = command.kind();
        debug!(conn_id, request_id = %request_id, command = %kind, "dispatching command");

        let conn = slot.conn.clone();
        let handlers = self.handlers.clone();
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let result = handlers.dispatch(command, &ctx).await;
            if !result.success {
                debug!(
                    request_id = %request_id,
                    command = %kind,
                    error = result.error.as_deref().unwrap_or_default(),
                    "command failed"
                );
            }
            send_message(&conn, &ServerMessage::Result { request_id, result });
        });
    }

    fn on_handshake_timeout(&mut self, conn_id: ConnId) {
        let Some(slot) = self.slots.get_mut(&conn_id) else {
            return;
        };
        slot.handshake_timer = None;
        if slot.welcome_sent || slot.hello_received {
            return;
        }

        if self.legacy_handshake {
            debug!(conn_id, "no client hello before timeout; sending welcome");
            send_welcome(&self.bus, slot);
        } else {
            reject_without_handshake(slot);
            self.remove_slot(conn_id);
        }
    }

    /// Serialize once and send to every welcomed client that has not
    /// already seen `event` in its replay.
    fn broadcast(&self, event: &SequencedEvent) {
        let message = ServerMessage::Event {
            event: event.event.clone(),
        };
        let text: Arc<str> = match message.encode() {
            Ok(text) => Arc::from(text),
            Err(e) => {
                warn!(error = %e, "failed to encode event");
                return;
            }
        };

        let mut recipients = 0;
        for (id, slot) in &self.slots {
            if !slot.welcome_sent || event.seq <= slot.replayed_through {
                continue;
            }
            if slot.conn.send(text.clone()) {
                recipients += 1;
            } else {
                debug!(conn_id = *id, "event send failed; client is closing");
            }
        }
        debug!(seq = event.seq, event = event.event.event_type(), recipients, "broadcast");
    }

    fn remove_slot(&mut self, conn_id: ConnId) -> bool {
        match self.slots.remove(&conn_id) {
            Some(mut slot) => {
                slot.cancel_timer();
                self.client_count.store(self.slots.len(), Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

fn send_welcome(bus: &EventBus, slot: &mut ClientSlot) {
    let snapshot = bus.snapshot();
    slot.welcome_sent = true;
    slot.replayed_through = snapshot.last_seq;
    debug!(
        conn_id = slot.conn.id(),
        replayed = snapshot.events.len(),
        "sending welcome"
    );
    send_message(
        &slot.conn,
        &ServerMessage::Welcome {
            session_id: bus.session_id().to_string(),
            buffered_events: snapshot.events,
        },
    );
}

fn reject_without_handshake(slot: &mut ClientSlot) {
    debug!(conn_id = slot.conn.id(), "closing client that skipped the handshake");
    slot.cancel_timer();
    send_message(
        &slot.conn,
        &ServerMessage::Error {
            code: "handshake_required".to_string(),
            message: format!(
                "Send a hello listing protocol version {} before issuing commands",
                PROTOCOL_VERSION
            ),
            details: None,
        },
    );
    slot.conn.close(CLOSE_PROTOCOL_ERROR, "Handshake required");
}

fn send_message(conn: &Connection, message: &ServerMessage) -> bool {
    match message.encode() {
        Ok(text) => conn.send(Arc::from(text)),
        Err(e) => {
            warn!(kind = message.kind(), error = %e, "failed to encode server message");
            false
        }
    }
}
