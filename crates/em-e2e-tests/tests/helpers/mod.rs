//! Shared test harness for E2E integration tests.
//!
//! Wires an `MqttClient` to a `MockEngine` and records every callback
//! invocation, so scenarios can drive engine events and assert on exactly
//! what the application saw.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use em_mqtt::{
    EngineEvent, ErrorDetail, ErrorKind, MockEngine, MqttClient, ProtocolEvent, QoS,
};

/// One observed callback invocation, with borrowed data copied out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    BeforeConnect,
    Connected(bool),
    Disconnected,
    Subscribed {
        msg_id: i32,
        error: ErrorKind,
        data: Vec<u8>,
    },
    Unsubscribed(i32),
    Message {
        msg_id: i32,
        topic: String,
        data: Vec<u8>,
        offset: usize,
        total_len: usize,
    },
    PublishConfirmed(i32),
    Deleted(i32),
    Error(ErrorDetail),
    Custom(i32),
}

/// Thread-safe list of callback invocations.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    pub fn push(&self, seen: Seen) {
        self.seen.lock().unwrap().push(seen);
    }

    pub fn all(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().unwrap().is_empty()
    }
}

/// End-to-end harness: a client over a mock engine with all ten callbacks
/// recording into a shared list.
pub struct TestHarness {
    pub engine: MockEngine,
    pub client: MqttClient<MockEngine>,
    pub seen: Recorder,
}

impl TestHarness {
    pub const BROKER: &'static str = "mqtt://broker.test:1883";

    /// Client with a broker URI and every callback registered, not created.
    pub fn new() -> Self {
        Self::with_engine(MockEngine::new())
    }

    pub fn with_engine(engine: MockEngine) -> Self {
        let mut client = MqttClient::new(engine.clone());
        client.set_broker_uri(Self::BROKER);
        let seen = Recorder::default();
        register_all(&client, &seen);
        Self {
            engine,
            client,
            seen,
        }
    }

    /// Harness with the network loop started.
    pub fn started() -> Self {
        let mut h = Self::new();
        h.client.start().unwrap();
        h
    }

    /// Harness started and connected, with the connect callbacks cleared
    /// from the recording.
    pub fn connected() -> Self {
        let h = Self::started();
        h.engine.emit(ProtocolEvent::BeforeConnect);
        h.engine.emit(ProtocolEvent::Connected {
            session_present: false,
        });
        h.seen.clear();
        h
    }

    pub fn emit(&self, event: ProtocolEvent<'_>) -> bool {
        self.engine.emit(event)
    }

    pub fn deliver(&self, msg_id: i32, topic: &str, data: &[u8]) {
        self.engine.deliver(msg_id, topic, data, QoS::AtLeastOnce);
    }
}

/// Register a recording handler for every event kind.
pub fn register_all(client: &MqttClient<MockEngine>, seen: &Recorder) {
    let r = seen.clone();
    client.on_before_connect(move || r.push(Seen::BeforeConnect));
    let r = seen.clone();
    client.on_connected(move |present| r.push(Seen::Connected(present)));
    let r = seen.clone();
    client.on_disconnected(move || r.push(Seen::Disconnected));
    let r = seen.clone();
    client.on_subscribed(move |msg_id, error, data| {
        r.push(Seen::Subscribed {
            msg_id,
            error,
            data: data.to_vec(),
        })
    });
    let r = seen.clone();
    client.on_unsubscribed(move |msg_id| r.push(Seen::Unsubscribed(msg_id)));
    let r = seen.clone();
    client.on_message_received(move |f| {
        r.push(Seen::Message {
            msg_id: f.msg_id,
            topic: f.topic.to_string(),
            data: f.data.to_vec(),
            offset: f.offset,
            total_len: f.total_len,
        })
    });
    let r = seen.clone();
    client.on_publish_confirmed(move |msg_id| r.push(Seen::PublishConfirmed(msg_id)));
    let r = seen.clone();
    client.on_message_deleted(move |msg_id| r.push(Seen::Deleted(msg_id)));
    let r = seen.clone();
    client.on_error(move |detail| r.push(Seen::Error(*detail)));
    let r = seen.clone();
    client.on_custom_event(move |event: &EngineEvent<'_>| {
        r.push(Seen::Custom(event.event.event_id()))
    });
}
