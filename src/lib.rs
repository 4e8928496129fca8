//! # rag-debug
//!
//! An embedded debug channel for retrieval-augmented-generation pipelines.
//!
//! The host application records instrumentation events on a process-wide
//! [`bus`]; an embedded [`server`] streams them over a WebSocket to any
//! number of inspector [`client`]s, which can also run commands (query,
//! ingest, store statistics, evals) against the live pipeline.
//!
//! ## Architecture
//!
//! ```text
//!  host application                                   inspector (ragdbg)
//! ┌──────────────────────────────────────────┐       ┌──────────────────┐
//! │ engine ──emit──▶ EventBus ──subscribe──┐ │       │   DebugClient    │
//! │                   (ring buffer)        ▼ │  ws   │  status / events │
//! │ handlers ◀──dispatch── DebugServer ◀──────────────▶  send_command   │
//! │  (engine, store, eval)     │ Transport   │       └──────────────────┘
//! │                            └ axum | tungstenite  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragdbg serve --demo            # host side: bus + server + in-memory engine
//! ragdbg watch                   # stream replayed and live events
//! ragdbg query "borrow checker"  # run a retrieval through the server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`bus`] | Process-wide event bus with replay buffer |
//! | [`subscribers`] | Callback sets shared by the bus and the client |
//! | [`transport`] | Socket-stack abstraction and its two adapters |
//! | [`server`] | Handshake, broadcast, and command dispatch |
//! | [`client`] | Inspector connection with reconnection and request correlation |
//! | [`handlers`] | Built-in command handlers |
//! | [`host`] | Engine, store-inspector, and eval-runner traits |
//! | [`memory`] | In-memory reference engine |
//! | [`config`] | TOML configuration and environment overrides |
//! | [`logging`] | tracing subscriber setup |
//!
//! The wire types live in the `rag-debug-protocol` crate, re-exported here
//! as [`protocol`].

pub mod bus;
pub mod client;
pub mod config;
pub mod handlers;
pub mod host;
pub mod logging;
pub mod memory;
pub mod server;
pub mod subscribers;
pub mod transport;

pub use rag_debug_protocol as protocol;
