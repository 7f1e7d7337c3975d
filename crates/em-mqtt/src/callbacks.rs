//! Application callback registry: one optional handler slot per event kind.

use std::fmt;
use std::sync::Arc;

use crate::event::{EngineEvent, ErrorDetail, ErrorKind, MessageFragment};

pub type BeforeConnectFn = dyn Fn() + Send + Sync;
pub type ConnectedFn = dyn Fn(bool) + Send + Sync;
pub type DisconnectedFn = dyn Fn() + Send + Sync;
pub type SubscribedFn = dyn Fn(i32, ErrorKind, &[u8]) + Send + Sync;
pub type MsgIdFn = dyn Fn(i32) + Send + Sync;
pub type MessageReceivedFn = dyn Fn(&MessageFragment<'_>) + Send + Sync;
pub type ErrorFn = dyn Fn(&ErrorDetail) + Send + Sync;
pub type CustomEventFn = dyn Fn(&EngineEvent<'_>) + Send + Sync;

/// Tag of a callback slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeConnect,
    Connected,
    Disconnected,
    Subscribed,
    Unsubscribed,
    MessageReceived,
    PublishConfirmed,
    Deleted,
    Error,
    Custom,
}

impl EventKind {
    pub const COUNT: usize = 10;

    pub const ALL: [EventKind; Self::COUNT] = [
        EventKind::BeforeConnect,
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::Subscribed,
        EventKind::Unsubscribed,
        EventKind::MessageReceived,
        EventKind::PublishConfirmed,
        EventKind::Deleted,
        EventKind::Error,
        EventKind::Custom,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// A registered handler, tagged by the kind it serves.
///
/// Handlers are reference-counted so a dispatch can take a clone and
/// run it without holding the registry lock.
#[derive(Clone)]
pub enum Callback {
    BeforeConnect(Arc<BeforeConnectFn>),
    /// Receives `session_present`.
    Connected(Arc<ConnectedFn>),
    Disconnected(Arc<DisconnectedFn>),
    /// Receives `(msg_id, error_kind, suback_payload)`.
    Subscribed(Arc<SubscribedFn>),
    Unsubscribed(Arc<MsgIdFn>),
    MessageReceived(Arc<MessageReceivedFn>),
    /// Fires for QoS 1 and 2 only; QoS 0 publishes are never confirmed.
    PublishConfirmed(Arc<MsgIdFn>),
    Deleted(Arc<MsgIdFn>),
    Error(Arc<ErrorFn>),
    Custom(Arc<CustomEventFn>),
}

impl Callback {
    pub fn kind(&self) -> EventKind {
        match self {
            Callback::BeforeConnect(_) => EventKind::BeforeConnect,
            Callback::Connected(_) => EventKind::Connected,
            Callback::Disconnected(_) => EventKind::Disconnected,
            Callback::Subscribed(_) => EventKind::Subscribed,
            Callback::Unsubscribed(_) => EventKind::Unsubscribed,
            Callback::MessageReceived(_) => EventKind::MessageReceived,
            Callback::PublishConfirmed(_) => EventKind::PublishConfirmed,
            Callback::Deleted(_) => EventKind::Deleted,
            Callback::Error(_) => EventKind::Error,
            Callback::Custom(_) => EventKind::Custom,
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.kind()).finish()
    }
}

/// Ten optional handler slots keyed by [`EventKind`].
pub struct CallbackRegistry {
    slots: [Option<Callback>; EventKind::COUNT],
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Install `callback` in its slot, returning the handler it replaced.
    pub fn set(&mut self, callback: Callback) -> Option<Callback> {
        let index = callback.kind().index();
        self.slots[index].replace(callback)
    }

    pub fn get(&self, kind: EventKind) -> Option<&Callback> {
        self.slots[kind.index()].as_ref()
    }

    pub fn clear(&mut self, kind: EventKind) -> Option<Callback> {
        self.slots[kind.index()].take()
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    /// Kinds with a handler installed.
    pub fn registered(&self) -> Vec<EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.is_registered(*kind))
            .collect()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}
