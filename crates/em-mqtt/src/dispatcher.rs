//! Event dispatcher: the engine's sole event sink for one facade.
//!
//! Runs on the engine's network thread while the application thread
//! publishes and registers callbacks. Shared state is explicit:
//! - connection state is an `AtomicBool`
//! - callbacks sit behind an `RwLock`; a dispatch clones the handler out
//!   and calls it with the lock released, so replacing a callback never
//!   races an in-flight call (the in-flight call finishes with the old one)

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::callbacks::{Callback, CallbackRegistry, EventKind};
use crate::decoder;
use crate::engine::ClientId;
use crate::event::{EngineEvent, ProtocolEvent};

const UNBOUND: u64 = 0;

/// Who we are connecting as, for the BeforeConnect trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub uri: String,
    pub client_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug)]
pub struct Dispatcher {
    owner: AtomicU64,
    deleted_events: AtomicBool,
    connected: AtomicBool,
    callbacks: RwLock<CallbackRegistry>,
    session: RwLock<SessionInfo>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            owner: AtomicU64::new(UNBOUND),
            deleted_events: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            callbacks: RwLock::new(CallbackRegistry::new()),
            session: RwLock::new(SessionInfo::default()),
        }
    }

    /// Accept events from `client` only.
    pub fn bind(&self, client: ClientId, deleted_events: bool, session: SessionInfo) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
        self.deleted_events.store(deleted_events, Ordering::Release);
        self.owner.store(client.as_u64(), Ordering::Release);
    }

    /// Stop accepting events from any client.
    pub fn unbind(&self) {
        self.owner.store(UNBOUND, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn register(&self, callback: Callback) -> Option<Callback> {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(callback)
    }

    pub fn unregister(&self, kind: EventKind) -> Option<Callback> {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear(kind)
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_registered(kind)
    }

    fn handler(&self, kind: EventKind) -> Option<Callback> {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
    }

    fn owns(&self, client: ClientId) -> bool {
        let owner = self.owner.load(Ordering::Acquire);
        owner != UNBOUND && owner == client.as_u64()
    }

    /// Route one engine event to at most one application callback.
    ///
    /// Events from a foreign client are dropped. A kind without a
    /// registered callback is a no-op apart from the connection state
    /// updates of Connected and Disconnected.
    pub fn dispatch(&self, event: &EngineEvent<'_>) {
        if !self.owns(event.client) {
            tracing::trace!(client = %event.client, "dropping event for foreign client");
            return;
        }

        match event.event {
            ProtocolEvent::BeforeConnect => {
                self.log_before_connect();
                if let Some(Callback::BeforeConnect(f)) = self.handler(EventKind::BeforeConnect) {
                    f();
                }
            }
            ProtocolEvent::Connected { session_present } => {
                tracing::debug!(session_present, "MQTT broker connected");
                self.connected.store(true, Ordering::Release);
                if let Some(Callback::Connected(f)) = self.handler(EventKind::Connected) {
                    f(session_present);
                }
            }
            ProtocolEvent::Disconnected => {
                tracing::debug!("MQTT broker disconnected");
                self.connected.store(false, Ordering::Release);
                if let Some(Callback::Disconnected(f)) = self.handler(EventKind::Disconnected) {
                    f();
                }
            }
            ProtocolEvent::Subscribed { msg_id, error, data } => {
                tracing::debug!(msg_id, "MQTT subscribed");
                if let Some(Callback::Subscribed(f)) = self.handler(EventKind::Subscribed) {
                    f(msg_id, error.kind(), data);
                }
            }
            ProtocolEvent::Unsubscribed { msg_id } => {
                tracing::debug!(msg_id, "MQTT unsubscribed");
                if let Some(Callback::Unsubscribed(f)) = self.handler(EventKind::Unsubscribed) {
                    f(msg_id);
                }
            }
            ProtocolEvent::Published { msg_id } => {
                tracing::debug!(msg_id, "MQTT publish confirmed");
                if let Some(Callback::PublishConfirmed(f)) =
                    self.handler(EventKind::PublishConfirmed)
                {
                    f(msg_id);
                }
            }
            ProtocolEvent::Data(ref fragment) => {
                tracing::debug!(
                    msg_id = fragment.msg_id,
                    topic = fragment.topic,
                    len = fragment.data.len(),
                    offset = fragment.offset,
                    total_len = fragment.total_len,
                    "MQTT data"
                );
                if let Some(Callback::MessageReceived(f)) =
                    self.handler(EventKind::MessageReceived)
                {
                    f(fragment);
                }
            }
            ProtocolEvent::Deleted { msg_id } if self.deleted_events.load(Ordering::Acquire) => {
                tracing::debug!(msg_id, "MQTT outbox message deleted");
                if let Some(Callback::Deleted(f)) = self.handler(EventKind::Deleted) {
                    f(msg_id);
                }
            }
            ProtocolEvent::Error(detail) => {
                tracing::debug!("MQTT error event");
                decoder::log_error(detail);
                if let Some(Callback::Error(f)) = self.handler(EventKind::Error) {
                    f(detail);
                }
            }
            // Unknown kinds, and Deleted on engines that do not announce
            // deletion support, go to the custom callback.
            ProtocolEvent::Deleted { .. } | ProtocolEvent::Other { .. } => {
                tracing::debug!(event_id = event.event.event_id(), "other MQTT event");
                if let Some(Callback::Custom(f)) = self.handler(EventKind::Custom) {
                    f(event);
                }
            }
        }
    }

    fn log_before_connect(&self) {
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        match &session.username {
            Some(username) => tracing::debug!(
                uri = %session.uri,
                client_name = ?session.client_name,
                username = %username,
                "connecting to MQTT broker"
            ),
            None => tracing::debug!(
                uri = %session.uri,
                client_name = ?session.client_name,
                "connecting to MQTT broker"
            ),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
