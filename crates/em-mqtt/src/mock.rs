//! Mock MQTT engine for testing without a real broker.
//!
//! Records every engine call and the configuration each handle was created
//! from, and lets tests push events into the registered sink as if they
//! came from the engine's network task.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::config::ConnectionConfig;
use crate::engine::{ClientId, Engine, EngineClient, EventSink};
use crate::error::{EngineError, EngineResult};
use crate::event::{EngineEvent, MessageFragment, ProtocolEvent, QoS};

/// A recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Init,
    RegisterSink,
    Start,
    Stop,
    Reconnect,
    Disconnect,
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },
    Enqueue {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        store: bool,
    },
    Subscribe {
        topic: String,
        qos: QoS,
    },
    Unsubscribe {
        topic: String,
    },
    Destroy,
}

/// Engine primitives whose failure can be scripted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Init,
    Register,
    Start,
    Stop,
    Reconnect,
    Disconnect,
}

#[derive(Default)]
struct MockState {
    calls: Vec<EngineCall>,
    configs: Vec<ConnectionConfig>,
    sink: Option<EventSink>,
    client: Option<ClientId>,
    failing: HashSet<MockOp>,
    results: VecDeque<i32>,
    next_msg_id: i32,
    unconfirmed: Vec<i32>,
    outbox_size: usize,
    deleted_events: bool,
    running: bool,
}

/// Mock implementation of the `Engine` trait.
///
/// Cheap to clone; clones share state, so a test keeps one clone and hands
/// the other to the client under test. Thread-safe via `Mutex` (fine for
/// test contexts).
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that reports support for outbox-deletion events.
    pub fn with_deleted_events() -> Self {
        let engine = Self::new();
        engine.state.lock().unwrap().deleted_events = true;
        engine
    }

    // ── Scripting ─────────────────────────────────────────────

    /// Make `op` fail until [`MockEngine::succeed`] is called.
    pub fn fail(&self, op: MockOp) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub fn succeed(&self, op: MockOp) {
        self.state.lock().unwrap().failing.remove(&op);
    }

    /// Queue a raw result code for the next publish-family call.
    pub fn push_result(&self, code: i32) {
        self.state.lock().unwrap().results.push_back(code);
    }

    pub fn set_outbox_size(&self, size: usize) {
        self.state.lock().unwrap().outbox_size = size;
    }

    /// Let the network task end on its own, as an engine without auto
    /// reconnect does after a connection error.
    pub fn end_task(&self) {
        self.state.lock().unwrap().running = false;
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| pred(c))
            .count()
    }

    /// Configuration the most recent handle was created from.
    pub fn last_config(&self) -> Option<ConnectionConfig> {
        self.state.lock().unwrap().configs.last().cloned()
    }

    /// Id of the live handle, if any.
    pub fn client_id(&self) -> Option<ClientId> {
        self.state.lock().unwrap().client
    }

    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Subscribe { topic, qos } => Some((topic.clone(), *qos)),
                _ => None,
            })
            .collect()
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.clear();
        state.unconfirmed.clear();
    }

    // ── Event injection ───────────────────────────────────────

    /// Deliver `event` as coming from the live handle. Returns false if no
    /// sink is registered.
    pub fn emit(&self, event: ProtocolEvent<'_>) -> bool {
        match self.client_id() {
            Some(client) => self.emit_as(client, event),
            None => false,
        }
    }

    /// Deliver `event` tagged with an arbitrary client id.
    pub fn emit_as(&self, client: ClientId, event: ProtocolEvent<'_>) -> bool {
        // Clone the sink out so callbacks may call back into the mock.
        let sink = self.state.lock().unwrap().sink.clone();
        match sink {
            Some(sink) => {
                sink(&EngineEvent::new(client, event));
                true
            }
            None => false,
        }
    }

    /// Deliver an inbound message as a single fragment.
    pub fn deliver(&self, msg_id: i32, topic: &str, data: &[u8], qos: QoS) -> bool {
        self.emit(ProtocolEvent::Data(MessageFragment {
            msg_id,
            topic,
            data,
            offset: 0,
            total_len: data.len(),
            retain: false,
            qos,
            dup: false,
        }))
    }

    /// Deliver an inbound message split into `chunk`-sized fragments, the
    /// way an engine with a small inbound buffer does.
    pub fn deliver_fragmented(
        &self,
        msg_id: i32,
        topic: &str,
        data: &[u8],
        qos: QoS,
        chunk: usize,
    ) {
        let chunk = chunk.max(1);
        for (index, part) in data.chunks(chunk).enumerate() {
            let offset = index * chunk;
            self.emit(ProtocolEvent::Data(MessageFragment {
                msg_id,
                topic: if offset == 0 { topic } else { "" },
                data: part,
                offset,
                total_len: data.len(),
                retain: false,
                qos,
                dup: false,
            }));
        }
    }

    /// Emit a Published event for every accepted QoS 1/2 publish so far.
    pub fn confirm_publishes(&self) {
        let pending = std::mem::take(&mut self.state.lock().unwrap().unconfirmed);
        for msg_id in pending {
            self.emit(ProtocolEvent::Published { msg_id });
        }
    }

    fn check(&self, op: MockOp, call: EngineCall) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failing.contains(&op) {
            return Err(EngineError::Status { op: op_name(op), code: -1 });
        }
        Ok(())
    }

    fn message_result(&self, call: EngineCall, qos: QoS) -> i32 {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some(code) = state.results.pop_front() {
            return code;
        }
        if qos == QoS::AtMostOnce {
            return 0;
        }
        state.next_msg_id += 1;
        let id = state.next_msg_id;
        state.unconfirmed.push(id);
        id
    }
}

fn op_name(op: MockOp) -> &'static str {
    match op {
        MockOp::Init => "init",
        MockOp::Register => "register",
        MockOp::Start => "start",
        MockOp::Stop => "stop",
        MockOp::Reconnect => "reconnect",
        MockOp::Disconnect => "disconnect",
    }
}

impl Engine for MockEngine {
    fn init(&self, config: &ConnectionConfig) -> EngineResult<Box<dyn EngineClient>> {
        self.check(MockOp::Init, EngineCall::Init)
            .map_err(|_| EngineError::Init("scripted init failure".into()))?;
        let id = ClientId::next();
        {
            let mut state = self.state.lock().unwrap();
            state.configs.push(config.clone());
            state.client = Some(id);
        }
        Ok(Box::new(MockClient {
            id,
            engine: self.clone(),
        }))
    }
}

struct MockClient {
    id: ClientId,
    engine: MockEngine,
}

impl EngineClient for MockClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn register_event_sink(&self, sink: EventSink) -> EngineResult<()> {
        self.engine
            .check(MockOp::Register, EngineCall::RegisterSink)
            .map_err(|_| EngineError::Register("scripted register failure".into()))?;
        self.engine.state.lock().unwrap().sink = Some(sink);
        Ok(())
    }

    fn start(&self) -> EngineResult<()> {
        self.engine.check(MockOp::Start, EngineCall::Start)?;
        self.engine.state.lock().unwrap().running = true;
        Ok(())
    }

    fn stop(&self) -> EngineResult<()> {
        self.engine.check(MockOp::Stop, EngineCall::Stop)?;
        self.engine.state.lock().unwrap().running = false;
        Ok(())
    }

    fn reconnect(&self) -> EngineResult<()> {
        self.engine.check(MockOp::Reconnect, EngineCall::Reconnect)
    }

    fn disconnect(&self) -> EngineResult<()> {
        self.engine.check(MockOp::Disconnect, EngineCall::Disconnect)
    }

    fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> i32 {
        let call = EngineCall::Publish {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        };
        self.engine.message_result(call, qos)
    }

    fn enqueue(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool, store: bool) -> i32 {
        let call = EngineCall::Enqueue {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
            store,
        };
        self.engine.message_result(call, qos)
    }

    fn subscribe(&self, topic: &str, qos: QoS) -> i32 {
        let call = EngineCall::Subscribe {
            topic: topic.to_string(),
            qos,
        };
        // Subscriptions always get an id, whatever the QoS.
        self.engine.message_result(call, QoS::AtLeastOnce)
    }

    fn unsubscribe(&self, topic: &str) -> i32 {
        let call = EngineCall::Unsubscribe {
            topic: topic.to_string(),
        };
        self.engine.message_result(call, QoS::AtLeastOnce)
    }

    fn outbox_size(&self) -> usize {
        self.engine.state.lock().unwrap().outbox_size
    }

    fn is_running(&self) -> bool {
        self.engine.state.lock().unwrap().running
    }

    fn supports_deleted_events(&self) -> bool {
        self.engine.state.lock().unwrap().deleted_events
    }

    fn destroy(&self) {
        let mut state = self.engine.state.lock().unwrap();
        state.calls.push(EngineCall::Destroy);
        state.sink = None;
        state.client = None;
        state.running = false;
    }
}
