//! # rag-debug protocol
//!
//! Shared vocabulary of the rag-debug channel: the instrumentation events a
//! host application emits, the commands an inspector can issue, and the
//! handshake/envelope messages both sides exchange over a text socket.
//!
//! This crate contains no tokio, socket, or filesystem dependencies. Both
//! the embedded broker and the inspector client encode and decode through
//! these types, so they stay in lock-step on the wire.
//!
//! ## Wire overview
//!
//! ```text
//!  inspector                                   host application
//!  ─────────                                   ────────────────
//!                  ◀── hello {protocolVersion, capabilities}
//!  hello {supportedProtocolVersions} ──▶
//!                  ◀── welcome {sessionId, bufferedEvents}
//!                  ◀── event {event}            (live stream)
//!  command {requestId, command} ──▶
//!                  ◀── result {requestId, result}
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`events`] | `DebugEvent` envelope and payload variants |
//! | [`commands`] | `DebugCommand` requests and `DebugCommandResult` replies |
//! | [`messages`] | `ServerMessage` / `ClientMessage` envelopes and decoding |
//! | [`capabilities`] | Advertised capabilities and their computation |

pub mod capabilities;
pub mod commands;
pub mod events;
pub mod messages;

pub use capabilities::{compute_capabilities, Capability, CapabilityInputs};
pub use commands::{CommandKind, DebugCommand, DebugCommandResult};
pub use events::{DebugEvent, EventPayload};
pub use messages::{
    decode_client_message, decode_server_message, ClientMessage, ServerInfo, ServerMessage,
};

/// Protocol version spoken by this build.
///
/// The server advertises exactly this version in its `hello`; a client
/// lists it as its only supported version. Any change to message shapes
/// that older peers cannot ignore must bump it.
pub const PROTOCOL_VERSION: u32 = 1;

/// Close code for a normal shutdown initiated by either side.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used after a protocol version mismatch.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;

/// Close code used when the server already has `maxClients` connections.
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Default TCP port of the debug server.
pub const DEFAULT_PORT: u16 = 3847;
