//! The seam between the facade and the MQTT protocol engine.
//!
//! The engine owns the wire protocol, the outbox and the network task.
//! Two impls:
//! - `RumqttEngine`: production, drives `rumqttc` on its own tokio runtime
//! - `MockEngine`: records calls and emits scripted events (in `mock.rs`)

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::ConnectionConfig;
use crate::error::EngineResult;
use crate::event::{EngineEvent, QoS};

/// Identity of one engine connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

impl ClientId {
    /// Allocate a process-unique id. Engines call this once per handle.
    pub fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// The single callback an engine invokes for every event of a handle.
pub type EventSink = Arc<dyn Fn(&EngineEvent<'_>) + Send + Sync>;

/// Factory for engine connections.
pub trait Engine: Send + Sync {
    /// Create a connection handle from a configuration snapshot.
    ///
    /// The engine keeps its own copy of whatever it needs; later changes to
    /// `config` do not reach the handle.
    fn init(&self, config: &ConnectionConfig) -> EngineResult<Box<dyn EngineClient>>;
}

/// Primitives of one engine connection.
///
/// Publish-family methods return engine status codes: a message id (`>= 0`),
/// `-1` on failure or `-2` when the outbox is full.
pub trait EngineClient: Send + Sync {
    fn id(&self) -> ClientId;

    /// Bind `sink` to every event kind of this connection.
    fn register_event_sink(&self, sink: EventSink) -> EngineResult<()>;

    fn start(&self) -> EngineResult<()>;

    fn stop(&self) -> EngineResult<()>;

    fn reconnect(&self) -> EngineResult<()>;

    fn disconnect(&self) -> EngineResult<()>;

    /// Send immediately from the caller's thread.
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> i32;

    /// Store in the outbox; the network task sends it later.
    fn enqueue(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool, store: bool) -> i32;

    fn subscribe(&self, topic: &str, qos: QoS) -> i32;

    fn unsubscribe(&self, topic: &str) -> i32;

    /// Bytes currently held in the outbox.
    fn outbox_size(&self) -> usize;

    /// Whether the network task runs. False before `start()`, after
    /// `stop()`, and once the task gave up on its own (auto reconnect
    /// disabled).
    fn is_running(&self) -> bool;

    /// Whether this engine emits outbox-deletion events.
    fn supports_deleted_events(&self) -> bool {
        false
    }

    /// Release engine resources. Called exactly once, when the owning
    /// handle is dropped.
    fn destroy(&self) {}
}

// ── Publish results ───────────────────────────────────────────

/// Normalized result of a publish-family call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Accepted by the engine. Message id is 0 for QoS 0.
    Accepted(i32),
    /// Generic failure (`-1`).
    Failed,
    /// Outbox full (`-2`).
    OutboxFull,
}

impl PublishOutcome {
    pub const FAILED_CODE: i32 = -1;
    pub const OUTBOX_FULL_CODE: i32 = -2;

    pub fn from_code(code: i32) -> Self {
        match code {
            id if id >= 0 => PublishOutcome::Accepted(id),
            Self::OUTBOX_FULL_CODE => PublishOutcome::OutboxFull,
            _ => PublishOutcome::Failed,
        }
    }

    /// Raw code: message id, `-1` or `-2`.
    pub fn code(self) -> i32 {
        match self {
            PublishOutcome::Accepted(id) => id,
            PublishOutcome::Failed => Self::FAILED_CODE,
            PublishOutcome::OutboxFull => Self::OUTBOX_FULL_CODE,
        }
    }

    pub fn msg_id(self) -> Option<i32> {
        match self {
            PublishOutcome::Accepted(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_accepted(self) -> bool {
        matches!(self, PublishOutcome::Accepted(_))
    }
}
