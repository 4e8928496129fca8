//! Process-wide instrumentation event bus.
//!
//! The [`EventBus`] is where the host application's instrumentation points
//! report what happened. It keeps a bounded FIFO buffer of recent events
//! (replayed to inspectors when they connect), a stable session id, an
//! enabled flag, and a set of subscriber callbacks (the debug server is
//! one of them).
//!
//! # Lifecycle
//!
//! ```text
//! init_global(&config.bus) ──▶ global() ──▶ emit(..) / record(..)
//!                                  │
//!                                  └──▶ DebugServer::start(bus, ..)
//! ```
//!
//! The global instance is created once, on first access, and lives until
//! the process exits. Servers receive the bus by injection (`Arc<EventBus>`)
//! rather than reaching for [`global`] themselves, so tests construct
//! private buses freely.
//!
//! # Ordering
//!
//! Each recorded event receives a monotonically increasing sequence number.
//! Subscribers are invoked in sequence order; recording is serialized so
//! concurrent emitters cannot reorder the broadcast relative to the buffer.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex};
use rag_debug_protocol::{DebugEvent, EventPayload};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::BusConfig;
use crate::subscribers::{SubscriberSet, Subscription};

/// Default number of events kept for replay.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// An event together with its position in the bus's recording order.
#[derive(Debug, Clone)]
pub struct SequencedEvent {
    /// Monotonic sequence number, starting at 1.
    pub seq: u64,
    pub event: DebugEvent,
}

/// Copy of the replay buffer plus the sequence number of its newest entry.
#[derive(Debug, Clone)]
pub struct BusSnapshot {
    pub events: Vec<DebugEvent>,
    /// Sequence of the last buffered event, or the last sequence ever
    /// assigned when the buffer is empty.
    pub last_seq: u64,
}

struct Buffer {
    entries: VecDeque<SequencedEvent>,
    last_seq: u64,
}

/// Buffered, fan-out event bus. See the [module docs](self).
pub struct EventBus {
    session_id: String,
    started_at: DateTime<Utc>,
    started_instant: Instant,
    enabled: AtomicBool,
    capacity: usize,
    buffer: Mutex<Buffer>,
    subscribers: SubscriberSet<SequencedEvent>,
    record_lock: ReentrantMutex<()>,
}

impl EventBus {
    /// Create an enabled bus keeping at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            started_instant: Instant::now(),
            enabled: AtomicBool::new(true),
            capacity: capacity.max(1),
            buffer: Mutex::new(Buffer {
                entries: VecDeque::new(),
                last_seq: 0,
            }),
            subscribers: SubscriberSet::new(),
            record_lock: ReentrantMutex::new(()),
        }
    }

    /// Create a bus from the `[bus]` configuration section.
    pub fn from_config(config: &BusConfig) -> Self {
        let bus = Self::new(config.buffer_capacity);
        bus.set_enabled(config.enabled);
        bus
    }

    /// Whether instrumentation is active. A disabled bus drops events and
    /// refuses to host a debug server.
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Stable identifier of this bus's session.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.started_instant.elapsed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `event` to the buffer, evicting the oldest entry when full,
    /// then invoke every subscriber with it.
    ///
    /// Returns the assigned sequence number, or `None` when the bus is
    /// disabled. Subscriber panics are contained.
    pub fn record(&self, event: DebugEvent) -> Option<u64> {
        if !self.enabled() {
            return None;
        }

        let _serial = self.record_lock.lock();
        let sequenced = {
            let mut buffer = self.buffer.lock();
            buffer.last_seq += 1;
            let sequenced = SequencedEvent {
                seq: buffer.last_seq,
                event,
            };
            if buffer.entries.len() >= self.capacity {
                buffer.entries.pop_front();
            }
            buffer.entries.push_back(sequenced.clone());
            sequenced
        };

        self.subscribers.notify(&sequenced);
        Some(sequenced.seq)
    }

    /// Build an event envelope for `payload` and record it.
    pub fn emit(&self, op_id: Option<&str>, payload: EventPayload) -> Option<u64> {
        if !self.enabled() {
            return None;
        }
        self.record(DebugEvent {
            timestamp: Utc::now().timestamp_millis(),
            session_id: self.session_id.clone(),
            op_id: op_id.map(str::to_string),
            payload,
        })
    }

    /// Register a callback invoked synchronously for every recorded event.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SequencedEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Copy of the buffered events, oldest first.
    pub fn buffer(&self) -> Vec<DebugEvent> {
        self.buffer
            .lock()
            .entries
            .iter()
            .map(|s| s.event.clone())
            .collect()
    }

    /// Copy of the buffered events together with the newest sequence number.
    pub fn snapshot(&self) -> BusSnapshot {
        let buffer = self.buffer.lock();
        BusSnapshot {
            events: buffer.entries.iter().map(|s| s.event.clone()).collect(),
            last_seq: buffer.last_seq,
        }
    }

    /// Empty the buffer, returning how many events were removed.
    pub fn clear_buffer(&self) -> usize {
        let mut buffer = self.buffer.lock();
        let cleared = buffer.entries.len();
        buffer.entries.clear();
        cleared
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().entries.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("session_id", &self.session_id)
            .field("enabled", &self.enabled())
            .field("capacity", &self.capacity)
            .field("buffered", &self.buffer_len())
            .finish()
    }
}

/// Mint a fresh operation id for correlating one operation's events.
pub fn new_op_id() -> String {
    Uuid::new_v4().to_string()
}

static GLOBAL: OnceLock<Arc<EventBus>> = OnceLock::new();

/// Initialize the process-wide bus from configuration.
///
/// The first call constructs the bus; later calls return the existing
/// instance and only update its enabled flag, so the session id stays
/// stable for the life of the process.
pub fn init_global(config: &BusConfig) -> Arc<EventBus> {
    let bus = GLOBAL.get_or_init(|| Arc::new(EventBus::from_config(config)));
    bus.set_enabled(config.enabled);
    bus.clone()
}

/// The process-wide bus, created disabled with default settings if
/// [`init_global`] has not run yet.
pub fn global() -> Arc<EventBus> {
    GLOBAL
        .get_or_init(|| Arc::new(EventBus::from_config(&BusConfig::default())))
        .clone()
}
