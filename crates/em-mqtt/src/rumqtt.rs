//! Production engine over `rumqttc`.
//!
//! Each handle owns an `AsyncClient` (the request side), its `EventLoop` and
//! a small tokio runtime whose "mqtt_task" worker drives the event loop while
//! started. rumqttc notifications are translated into [`ProtocolEvent`]s and
//! handed to the registered sink on that worker.
//!
//! Requests never wait for the event loop: when its request channel is full
//! the call reports an outbox-full status instead.
//!
//! rumqttc does not hand out packet ids when a request is queued, so the
//! adapter allocates its own message ids and pairs them with packet ids in
//! the order the event loop reports the outgoing packets.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, NetworkOptions, Outgoing, Packet,
    SubscribeReasonCode,
};
use tokio::runtime::Runtime;
use tokio::sync::{Mutex as AsyncMutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use url::Url;

use crate::config::ConnectionConfig;
use crate::engine::{ClientId, Engine, EngineClient, EventSink};
use crate::error::{EngineError, EngineResult};
use crate::event::{
    ConnectReturnCode, EngineEvent, ErrorDetail, MessageFragment, ProtocolEvent, QoS,
};
use crate::tls;

/// Capacity of the request channel between the client and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// Name of the runtime threads that drive the event loop and run callbacks.
const TASK_THREAD: &str = "mqtt_task";

/// Extra time `stop()` allows beyond the network timeout.
const STOP_MARGIN: Duration = Duration::from_secs(1);

const SUBACK_FAILURE: u8 = 0x80;

const FAILED: i32 = -1;
const OUTBOX_FULL: i32 = -2;

/// Engine factory backed by rumqttc.
#[derive(Debug, Clone, Copy, Default)]
pub struct RumqttEngine;

impl RumqttEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for RumqttEngine {
    fn init(&self, config: &ConnectionConfig) -> EngineResult<Box<dyn EngineClient>> {
        let uri = config
            .uri
            .as_deref()
            .ok_or_else(|| EngineError::Init("broker URI is not set".into()))?;
        let endpoint = Endpoint::parse(uri)?;

        let in_buffer = positive("in_buffer_size", config.in_buffer_size)?;
        positive("out_buffer_size", config.out_buffer_size)?;
        let keep_alive = positive("keep_alive_secs", config.keep_alive_secs)?;
        let reconnect_ms = positive("reconnect_timeout_ms", config.reconnect_timeout_ms)?;
        let network_ms = positive("network_timeout_ms", config.network_timeout_ms)?;

        let transport = tls::transport_for(&endpoint.scheme, config)?;

        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("em-{}", uuid::Uuid::now_v7().simple()));
        if client_id.is_empty() || client_id.starts_with(' ') {
            return Err(EngineError::Init(format!("invalid client id '{client_id}'")));
        }

        let mut options = MqttOptions::new(client_id.as_str(), endpoint.host.as_str(), endpoint.port);
        options.set_keep_alive(Duration::from_secs(keep_alive as u64));
        options.set_clean_session(config.clean_session);
        options.set_transport(transport);
        if let Some(username) = &config.username {
            options.set_credentials(username.as_str(), config.password.as_deref().unwrap_or(""));
        }
        if let Some(will) = &config.last_will {
            options.set_last_will(rumqttc::LastWill::new(
                will.topic.as_str(),
                will.message.as_bytes().to_vec(),
                to_rumqttc(will.qos),
                will.retain,
            ));
        }

        let (requests, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let mut network = NetworkOptions::new();
        network.set_connection_timeout((network_ms as u64).div_ceil(1000));
        eventloop.set_network_options(network);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(TASK_THREAD)
            .enable_all()
            .build()
            .map_err(|e| EngineError::Init(format!("failed to build MQTT runtime: {e}")))?;

        let id = ClientId::next();
        tracing::info!(
            client = %id,
            client_id = %client_id,
            host = %endpoint.host,
            port = endpoint.port,
            scheme = %endpoint.scheme,
            task_priority = config.task_priority,
            "MQTT engine client created"
        );

        let shared = Arc::new(Shared::new(
            id,
            LoopSettings {
                auto_reconnect: config.auto_reconnect,
                reconnect_delay: Duration::from_millis(reconnect_ms as u64),
                network_timeout: Duration::from_millis(network_ms as u64),
                in_buffer_size: in_buffer as usize,
            },
            requests,
        ));

        Ok(Box::new(RumqttClient {
            shared,
            eventloop: Arc::new(AsyncMutex::new(eventloop)),
            runtime: Mutex::new(Some(runtime)),
            run: Mutex::new(None),
            send_order: Mutex::new(()),
        }))
    }
}

fn positive(name: &str, value: i32) -> EngineResult<i32> {
    if value > 0 {
        Ok(value)
    } else {
        Err(EngineError::Init(format!("{name} must be positive, got {value}")))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Broker address ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
}

impl Endpoint {
    fn parse(uri: &str) -> EngineResult<Self> {
        let url = Url::parse(uri)
            .map_err(|e| EngineError::Init(format!("invalid broker URI '{uri}': {e}")))?;
        let scheme = url.scheme().to_string();
        let tls = tls::scheme_uses_tls(&scheme)
            .ok_or_else(|| EngineError::Init(format!("unsupported broker scheme '{scheme}'")))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| EngineError::Init(format!("broker URI '{uri}' has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });
        Ok(Self { scheme, host, port })
    }
}

// ── QoS conversion ────────────────────────────────────────────

fn to_rumqttc(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn from_rumqttc(qos: rumqttc::QoS) -> QoS {
    match qos {
        rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
        rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
        rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}

fn connect_code(code: rumqttc::ConnectReturnCode) -> ConnectReturnCode {
    match code {
        rumqttc::ConnectReturnCode::Success => ConnectReturnCode::Accepted,
        rumqttc::ConnectReturnCode::RefusedProtocolVersion => ConnectReturnCode::ProtocolRefused,
        rumqttc::ConnectReturnCode::BadClientId => ConnectReturnCode::IdRejected,
        rumqttc::ConnectReturnCode::ServiceUnavailable => ConnectReturnCode::ServerUnavailable,
        rumqttc::ConnectReturnCode::BadUserNamePassword => ConnectReturnCode::BadCredentials,
        rumqttc::ConnectReturnCode::NotAuthorized => ConnectReturnCode::NotAuthorized,
    }
}

// ── Message id correlation ────────────────────────────────────

/// Pairs adapter message ids with rumqttc packet ids.
///
/// Requests enter rumqttc's channel in the order ids are queued here, and
/// the event loop reports outgoing packets in that same order per kind.
#[derive(Debug, Default)]
struct MessageIds {
    last: i32,
    publishes: VecDeque<(i32, usize)>,
    subscribes: VecDeque<i32>,
    unsubscribes: VecDeque<i32>,
    publishes_in_flight: HashMap<u16, (i32, usize)>,
    subscribes_in_flight: HashMap<u16, i32>,
    unsubscribes_in_flight: HashMap<u16, i32>,
}

impl MessageIds {
    fn allocate(&mut self) -> i32 {
        self.last = if self.last == i32::MAX { 1 } else { self.last + 1 };
        self.last
    }

    /// QoS 0 publishes get id 0 and are never confirmed.
    fn queue_publish(&mut self, qos: QoS, len: usize) -> i32 {
        let msg_id = if qos == QoS::AtMostOnce { 0 } else { self.allocate() };
        self.publishes.push_back((msg_id, len));
        msg_id
    }

    fn queue_subscribe(&mut self) -> i32 {
        let msg_id = self.allocate();
        self.subscribes.push_back(msg_id);
        msg_id
    }

    fn queue_unsubscribe(&mut self) -> i32 {
        let msg_id = self.allocate();
        self.unsubscribes.push_back(msg_id);
        msg_id
    }

    /// Undo the most recent publish queued, after the request was refused.
    fn unqueue_publish(&mut self) {
        self.publishes.pop_back();
    }

    fn unqueue_subscribe(&mut self) {
        self.subscribes.pop_back();
    }

    fn unqueue_unsubscribe(&mut self) {
        self.unsubscribes.pop_back();
    }

    fn sent_publish(&mut self, pkid: u16) {
        // Retransmission of a packet already tracked.
        if pkid != 0 && self.publishes_in_flight.contains_key(&pkid) {
            return;
        }
        let Some(entry) = self.publishes.pop_front() else {
            return;
        };
        if pkid != 0 {
            self.publishes_in_flight.insert(pkid, entry);
        }
    }

    fn sent_subscribe(&mut self, pkid: u16) {
        if self.subscribes_in_flight.contains_key(&pkid) {
            return;
        }
        if let Some(msg_id) = self.subscribes.pop_front() {
            self.subscribes_in_flight.insert(pkid, msg_id);
        }
    }

    fn sent_unsubscribe(&mut self, pkid: u16) {
        if self.unsubscribes_in_flight.contains_key(&pkid) {
            return;
        }
        if let Some(msg_id) = self.unsubscribes.pop_front() {
            self.unsubscribes_in_flight.insert(pkid, msg_id);
        }
    }

    fn published(&mut self, pkid: u16) -> Option<i32> {
        self.publishes_in_flight.remove(&pkid).map(|(msg_id, _)| msg_id)
    }

    fn subscribed(&mut self, pkid: u16) -> i32 {
        self.subscribes_in_flight.remove(&pkid).unwrap_or(i32::from(pkid))
    }

    fn unsubscribed(&mut self, pkid: u16) -> i32 {
        self.unsubscribes_in_flight.remove(&pkid).unwrap_or(i32::from(pkid))
    }

    /// Payload bytes queued or awaiting acknowledgement.
    fn outbox_bytes(&self) -> usize {
        self.publishes.iter().map(|(_, len)| len).sum::<usize>()
            + self
                .publishes_in_flight
                .values()
                .map(|(_, len)| len)
                .sum::<usize>()
    }
}

// ── Network task ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct LoopSettings {
    auto_reconnect: bool,
    reconnect_delay: Duration,
    network_timeout: Duration,
    in_buffer_size: usize,
}

/// State shared between the handle and its network task.
struct Shared {
    id: ClientId,
    settings: LoopSettings,
    requests: AsyncClient,
    sink: RwLock<Option<EventSink>>,
    ids: Mutex<MessageIds>,
    session_up: AtomicBool,
    /// Set by `disconnect()`: stay offline until `reconnect()` or `stop()`.
    paused: watch::Sender<bool>,
    /// Cuts the reconnect delay short.
    reconnect_now: Notify,
}

impl Shared {
    fn new(id: ClientId, settings: LoopSettings, requests: AsyncClient) -> Self {
        Self {
            id,
            settings,
            requests,
            sink: RwLock::new(None),
            ids: Mutex::new(MessageIds::default()),
            session_up: AtomicBool::new(false),
            paused: watch::Sender::new(false),
            reconnect_now: Notify::new(),
        }
    }

    fn emit(&self, event: ProtocolEvent<'_>) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            sink(&EngineEvent::new(self.id, event));
        }
    }

    fn session_up(&self) -> bool {
        self.session_up.load(Ordering::SeqCst)
    }

    fn paused(&self) -> bool {
        *self.paused.borrow()
    }

    fn request_disconnect(&self) -> bool {
        match self.requests.try_disconnect() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(client = %self.id, error = %e, "could not queue MQTT disconnect");
                false
            }
        }
    }

    /// Translate one rumqttc notification.
    fn handle_event(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == rumqttc::ConnectReturnCode::Success {
                    self.session_up.store(true, Ordering::SeqCst);
                    self.emit(ProtocolEvent::Connected {
                        session_present: ack.session_present,
                    });
                    // disconnect() arrived while this attempt was in flight.
                    if self.paused() {
                        tracing::debug!(client = %self.id, "connected while paused, disconnecting");
                        self.request_disconnect();
                    }
                } else {
                    self.emit(ProtocolEvent::Error(&ErrorDetail::refused(connect_code(ack.code))));
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                self.deliver(
                    i32::from(publish.pkid),
                    &publish.topic,
                    &publish.payload,
                    from_rumqttc(publish.qos),
                    publish.retain,
                    publish.dup,
                );
            }
            Event::Incoming(Packet::PubAck(ack)) => self.confirm(ack.pkid),
            Event::Incoming(Packet::PubComp(comp)) => self.confirm(comp.pkid),
            Event::Incoming(Packet::SubAck(ack)) => {
                let msg_id = lock(&self.ids).subscribed(ack.pkid);
                let granted: Vec<u8> = ack
                    .return_codes
                    .iter()
                    .map(|code| match code {
                        SubscribeReasonCode::Success(qos) => from_rumqttc(*qos).level(),
                        SubscribeReasonCode::Failure => SUBACK_FAILURE,
                    })
                    .collect();
                self.emit(ProtocolEvent::Subscribed {
                    msg_id,
                    error: &ErrorDetail::None,
                    data: &granted,
                });
            }
            Event::Incoming(Packet::UnsubAck(ack)) => {
                let msg_id = lock(&self.ids).unsubscribed(ack.pkid);
                self.emit(ProtocolEvent::Unsubscribed { msg_id });
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => lock(&self.ids).sent_publish(pkid),
            Event::Outgoing(Outgoing::Subscribe(pkid)) => lock(&self.ids).sent_subscribe(pkid),
            Event::Outgoing(Outgoing::Unsubscribe(pkid)) => {
                lock(&self.ids).sent_unsubscribe(pkid)
            }
            Event::Outgoing(Outgoing::Disconnect) => self.end_session(),
            other => tracing::trace!(client = %self.id, event = ?other, "MQTT notification"),
        }
    }

    /// Emit an inbound message, split into fragments no longer than the
    /// inbound buffer.
    fn deliver(&self, msg_id: i32, topic: &str, payload: &[u8], qos: QoS, retain: bool, dup: bool) {
        let chunk = self.settings.in_buffer_size.max(1);
        if payload.is_empty() {
            self.emit(ProtocolEvent::Data(MessageFragment {
                msg_id,
                topic,
                data: payload,
                offset: 0,
                total_len: 0,
                retain,
                qos,
                dup,
            }));
            return;
        }
        for (index, data) in payload.chunks(chunk).enumerate() {
            let offset = index * chunk;
            self.emit(ProtocolEvent::Data(MessageFragment {
                msg_id,
                topic: if offset == 0 { topic } else { "" },
                data,
                offset,
                total_len: payload.len(),
                retain,
                qos,
                dup,
            }));
        }
    }

    fn confirm(&self, pkid: u16) {
        let msg_id = lock(&self.ids).published(pkid);
        match msg_id {
            Some(msg_id) => self.emit(ProtocolEvent::Published { msg_id }),
            None => tracing::debug!(client = %self.id, pkid, "acknowledgement for untracked packet"),
        }
    }

    fn end_session(&self) {
        if self.session_up.swap(false, Ordering::SeqCst) {
            self.emit(ProtocolEvent::Disconnected);
        }
    }

    fn connection_failed(&self, error: &ConnectionError) {
        match error {
            ConnectionError::ConnectionRefused(code) => {
                tracing::warn!(client = %self.id, ?code, "MQTT connection refused");
                self.end_session();
                self.emit(ProtocolEvent::Error(&ErrorDetail::refused(connect_code(*code))));
            }
            ConnectionError::Io(e) => {
                tracing::warn!(client = %self.id, error = %e, "MQTT transport error");
                self.end_session();
                self.emit(ProtocolEvent::Error(&ErrorDetail::transport(
                    e.raw_os_error().unwrap_or(0),
                )));
            }
            other => {
                tracing::warn!(client = %self.id, error = %other, "MQTT connection error");
                self.end_session();
                self.emit(ProtocolEvent::Error(&ErrorDetail::transport(0)));
            }
        }
    }

    /// Wait while paused. Returns `false` once the run is stopped.
    async fn resumed(&self, stop: &mut watch::Receiver<bool>) -> bool {
        let mut paused = self.paused.subscribe();
        tokio::select! {
            biased;
            () = stop_requested(stop) => false,
            _ = paused.wait_for(|paused| !*paused) => true,
        }
    }

    /// Sleep before the next connection attempt, cut short by `reconnect()`.
    /// Returns `false` once the run is stopped.
    async fn reconnect_delay(&self, stop: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            biased;
            () = stop_requested(stop) => false,
            () = self.reconnect_now.notified() => true,
            () = time::sleep(self.settings.reconnect_delay) => true,
        }
    }
}

/// Resolves once `stop()` was called for this run.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    // A dropped sender ends the run as well.
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Body of the network task.
///
/// `_done` is dropped when the task ends, however it ends; `stop()` waits
/// for that.
async fn drive(
    shared: Arc<Shared>,
    eventloop: Arc<AsyncMutex<EventLoop>>,
    mut stop: watch::Receiver<bool>,
    _done: mpsc::Sender<()>,
) {
    // A previous run may still be closing its session.
    let mut eventloop = eventloop.lock().await;
    tracing::info!(client = %shared.id, "MQTT network task started");

    'session: while shared.resumed(&mut stop).await {
        shared.emit(ProtocolEvent::BeforeConnect);
        // Set once stopping with a session up: the DISCONNECT must go out first.
        let mut deadline: Option<Instant> = None;

        loop {
            let notification = tokio::select! {
                biased;
                () = stop_requested(&mut stop), if deadline.is_none() => {
                    if !shared.session_up() || !shared.request_disconnect() {
                        break 'session;
                    }
                    deadline = Some(Instant::now() + shared.settings.network_timeout);
                    continue;
                }
                () = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    tracing::warn!(client = %shared.id, "MQTT disconnect not sent before stop deadline");
                    break 'session;
                }
                notification = eventloop.poll() => notification,
            };

            match notification {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    // Drop the socket now; unsent requests wait for the next session.
                    eventloop.clean();
                    shared.end_session();
                    if deadline.is_some() {
                        break 'session;
                    }
                    continue 'session;
                }
                Ok(event) => shared.handle_event(event),
                Err(e) => {
                    if deadline.is_some() {
                        break 'session;
                    }
                    shared.connection_failed(&e);
                    if !shared.settings.auto_reconnect {
                        tracing::warn!(client = %shared.id, "auto reconnect disabled, MQTT network task exiting");
                        break 'session;
                    }
                    if !shared.reconnect_delay(&mut stop).await {
                        break 'session;
                    }
                    continue 'session;
                }
            }
        }
    }

    eventloop.clean();
    shared.end_session();
    tracing::info!(client = %shared.id, "MQTT network task stopped");
}

// ── Engine client ─────────────────────────────────────────────

/// One started run of the network task.
struct Run {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    /// Disconnects when the task ends.
    done: mpsc::Receiver<()>,
}

impl Run {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

struct RumqttClient {
    shared: Arc<Shared>,
    eventloop: Arc<AsyncMutex<EventLoop>>,
    runtime: Mutex<Option<Runtime>>,
    run: Mutex<Option<Run>>,
    /// Held while a request is queued, so message ids and requests enter
    /// their queues in the same order.
    send_order: Mutex<()>,
}

/// Whether the caller is a callback running on a network task.
fn on_task_thread() -> bool {
    thread::current().name() == Some(TASK_THREAD)
}

impl EngineClient for RumqttClient {
    fn id(&self) -> ClientId {
        self.shared.id
    }

    fn register_event_sink(&self, sink: EventSink) -> EngineResult<()> {
        *self.shared.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        Ok(())
    }

    fn start(&self) -> EngineResult<()> {
        let mut run = lock(&self.run);
        if run.as_ref().is_some_and(Run::is_running) {
            return Err(EngineError::InvalidState {
                op: "start",
                reason: "network task is already running".into(),
            });
        }

        let runtime = lock(&self.runtime);
        let runtime = runtime.as_ref().ok_or_else(|| EngineError::InvalidState {
            op: "start",
            reason: "engine client was destroyed".into(),
        })?;

        let (stop, stop_rx) = watch::channel(false);
        let (done_tx, done) = mpsc::channel();
        let task = runtime.spawn(drive(
            Arc::clone(&self.shared),
            Arc::clone(&self.eventloop),
            stop_rx,
            done_tx,
        ));
        *run = Some(Run { stop, task, done });
        Ok(())
    }

    fn stop(&self) -> EngineResult<()> {
        let run = lock(&self.run).take().ok_or_else(|| EngineError::InvalidState {
            op: "stop",
            reason: "network task is not running".into(),
        })?;

        // Stop first, so a paused task does not resume and reconnect.
        run.stop.send_replace(true);
        self.shared.paused.send_replace(false);

        if on_task_thread() {
            // Called from a callback: the task exits once it returns.
            return Ok(());
        }
        // A plain channel wait works from async and blocking callers alike.
        let grace = self.shared.settings.network_timeout + STOP_MARGIN;
        if let Err(RecvTimeoutError::Timeout) = run.done.recv_timeout(grace) {
            tracing::warn!(client = %self.shared.id, "MQTT network task did not stop in time, aborting it");
            run.task.abort();
        }
        Ok(())
    }

    fn reconnect(&self) -> EngineResult<()> {
        if !self.is_running() {
            return Err(EngineError::InvalidState {
                op: "reconnect",
                reason: "network task is not running".into(),
            });
        }
        if self.shared.paused.send_replace(false) {
            return Ok(());
        }
        if self.shared.session_up() {
            if !self.shared.request_disconnect() {
                return Err(EngineError::Status {
                    op: "reconnect",
                    code: FAILED,
                });
            }
        } else {
            self.shared.reconnect_now.notify_one();
        }
        Ok(())
    }

    fn disconnect(&self) -> EngineResult<()> {
        self.shared.paused.send_replace(true);
        if self.shared.session_up() && !self.shared.request_disconnect() {
            return Err(EngineError::Status {
                op: "disconnect",
                code: FAILED,
            });
        }
        Ok(())
    }

    fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> i32 {
        if !rumqttc::valid_topic(topic) {
            tracing::debug!(topic, "invalid publish topic");
            return FAILED;
        }
        let _order = lock(&self.send_order);
        let msg_id = lock(&self.shared.ids).queue_publish(qos, payload.len());
        match self
            .shared
            .requests
            .try_publish(topic, to_rumqttc(qos), retain, payload.to_vec())
        {
            Ok(()) => msg_id,
            Err(_) => {
                lock(&self.shared.ids).unqueue_publish();
                tracing::debug!(topic, "MQTT request queue full, publish refused");
                OUTBOX_FULL
            }
        }
    }

    fn enqueue(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool, store: bool) -> i32 {
        if !rumqttc::valid_topic(topic) {
            tracing::debug!(topic, "invalid publish topic");
            return FAILED;
        }
        let _order = lock(&self.send_order);
        let msg_id = lock(&self.shared.ids).queue_publish(qos, payload.len());
        match self
            .shared
            .requests
            .try_publish(topic, to_rumqttc(qos), retain, payload.to_vec())
        {
            Ok(()) => msg_id,
            Err(_) => {
                lock(&self.shared.ids).unqueue_publish();
                if !store && qos == QoS::AtMostOnce {
                    tracing::debug!(topic, "outbox busy, QoS 0 message dropped");
                    0
                } else {
                    OUTBOX_FULL
                }
            }
        }
    }

    fn subscribe(&self, topic: &str, qos: QoS) -> i32 {
        if !rumqttc::valid_filter(topic) {
            tracing::debug!(topic, "invalid subscribe filter");
            return FAILED;
        }
        let _order = lock(&self.send_order);
        let msg_id = lock(&self.shared.ids).queue_subscribe();
        match self.shared.requests.try_subscribe(topic, to_rumqttc(qos)) {
            Ok(()) => msg_id,
            Err(_) => {
                lock(&self.shared.ids).unqueue_subscribe();
                tracing::debug!(topic, "MQTT request queue full, subscribe refused");
                OUTBOX_FULL
            }
        }
    }

    fn unsubscribe(&self, topic: &str) -> i32 {
        if !rumqttc::valid_filter(topic) {
            tracing::debug!(topic, "invalid unsubscribe filter");
            return FAILED;
        }
        let _order = lock(&self.send_order);
        let msg_id = lock(&self.shared.ids).queue_unsubscribe();
        match self.shared.requests.try_unsubscribe(topic) {
            Ok(()) => msg_id,
            Err(_) => {
                lock(&self.shared.ids).unqueue_unsubscribe();
                tracing::debug!(topic, "MQTT request queue full, unsubscribe refused");
                OUTBOX_FULL
            }
        }
    }

    fn outbox_size(&self) -> usize {
        lock(&self.shared.ids).outbox_bytes()
    }

    fn is_running(&self) -> bool {
        lock(&self.run).as_ref().is_some_and(Run::is_running)
    }

    fn destroy(&self) {
        if lock(&self.run).is_some() {
            if let Err(e) = self.stop() {
                tracing::warn!(client = %self.shared.id, error = %e, "stopping MQTT network task failed");
            }
        }
        *self.shared.sink.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.shutdown_runtime();
    }
}

impl RumqttClient {
    /// The only way of releasing a runtime that is safe inside async code.
    fn shutdown_runtime(&self) {
        if let Some(runtime) = lock(&self.runtime).take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for RumqttClient {
    fn drop(&mut self) {
        self.shutdown_runtime();
    }
}
