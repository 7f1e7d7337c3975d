//! `MqttClient`: configuration setters, connection lifecycle and
//! callback registration.
//!
//! Typical use: call setters, register callbacks, then `start()`. The
//! engine's network task delivers events to the callbacks from its own
//! thread; see [`crate::dispatcher`] for the synchronization contract.

use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::callbacks::{Callback, EventKind};
use crate::config::{self, ConnectionConfig, LastWill};
use crate::decoder;
use crate::dispatcher::{Dispatcher, SessionInfo};
use crate::engine::{ClientId, Engine, EventSink};
use crate::error::{ConfigError, EngineResult, MqttResult};
use crate::event::{EngineEvent, ErrorDetail, ErrorKind, MessageFragment, QoS};
use crate::handle::ConnectionHandle;

/// Where the client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NoHandle,
    HandleCreated,
    Started,
}

/// Callback-driven MQTT client over an [`Engine`].
pub struct MqttClient<E: Engine> {
    engine: E,
    config: ConnectionConfig,
    handle: Option<ConnectionHandle>,
    started: bool,
    dispatcher: Arc<Dispatcher>,
}

impl<E: Engine> MqttClient<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            config: ConnectionConfig::default(),
            handle: None,
            started: false,
            dispatcher: Arc::new(Dispatcher::new()),
        }
    }

    // ── Callback registration ─────────────────────────────────

    pub fn on_before_connect(&self, f: impl Fn() + Send + Sync + 'static) {
        self.set_callback(Callback::BeforeConnect(Arc::new(f)));
    }

    /// `f` receives the broker's `session_present` flag.
    pub fn on_connected(&self, f: impl Fn(bool) + Send + Sync + 'static) {
        self.set_callback(Callback::Connected(Arc::new(f)));
    }

    pub fn on_disconnected(&self, f: impl Fn() + Send + Sync + 'static) {
        self.set_callback(Callback::Disconnected(Arc::new(f)));
    }

    /// `f` receives `(msg_id, error_kind, suback_payload)`.
    pub fn on_subscribed(&self, f: impl Fn(i32, ErrorKind, &[u8]) + Send + Sync + 'static) {
        self.set_callback(Callback::Subscribed(Arc::new(f)));
    }

    pub fn on_unsubscribed(&self, f: impl Fn(i32) + Send + Sync + 'static) {
        self.set_callback(Callback::Unsubscribed(Arc::new(f)));
    }

    /// Called once per fragment. Messages longer than the inbound buffer
    /// arrive in several calls sharing a msg id; reassembly is up to `f`.
    pub fn on_message_received(
        &self,
        f: impl Fn(&MessageFragment<'_>) + Send + Sync + 'static,
    ) {
        self.set_callback(Callback::MessageReceived(Arc::new(f)));
    }

    /// Only QoS 1 and 2 publishes are ever confirmed.
    pub fn on_publish_confirmed(&self, f: impl Fn(i32) + Send + Sync + 'static) {
        self.set_callback(Callback::PublishConfirmed(Arc::new(f)));
    }

    /// Never fires on engines without outbox-deletion events.
    pub fn on_message_deleted(&self, f: impl Fn(i32) + Send + Sync + 'static) {
        self.set_callback(Callback::Deleted(Arc::new(f)));
    }

    pub fn on_error(&self, f: impl Fn(&ErrorDetail) + Send + Sync + 'static) {
        self.set_callback(Callback::Error(Arc::new(f)));
    }

    /// Receives every event kind the client does not model.
    pub fn on_custom_event(&self, f: impl Fn(&EngineEvent<'_>) + Send + Sync + 'static) {
        self.set_callback(Callback::Custom(Arc::new(f)));
    }

    pub fn set_callback(&self, callback: Callback) -> Option<Callback> {
        self.dispatcher.register(callback)
    }

    pub fn clear_callback(&self, kind: EventKind) -> Option<Callback> {
        self.dispatcher.unregister(kind)
    }

    // ── Configuration ─────────────────────────────────────────

    pub fn set_broker_uri(&mut self, uri: impl Into<String>) {
        let uri = uri.into();
        tracing::debug!(uri = %uri, "MQTT broker uri");
        self.config.uri = Some(uri);
    }

    /// Broker as `scheme://host:port`. Scheme is one of mqtt, mqtts, ws, wss.
    pub fn set_broker_url(&mut self, host: &str, port: u16, scheme: &str) {
        self.set_broker_uri(config::broker_url(host, port, scheme));
    }

    /// Broker as `scheme://a.b.c.d:port`.
    pub fn set_broker_ip(&mut self, ip: Ipv4Addr, port: u16, scheme: &str) {
        self.set_broker_uri(config::broker_ip(ip, port, scheme));
    }

    pub fn set_client_name(&mut self, name: impl Into<String>) {
        self.config.client_id = Some(name.into());
    }

    pub fn set_credentials(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
    }

    pub fn set_client_cert(&mut self, pem: impl Into<Vec<u8>>) {
        self.config.client_cert = Some(pem.into());
    }

    pub fn set_ca_cert(&mut self, pem: impl Into<Vec<u8>>) {
        self.config.ca_cert = Some(pem.into());
    }

    pub fn set_auth_key(&mut self, pem: impl Into<Vec<u8>>) {
        self.config.client_key = Some(pem.into());
    }

    pub fn set_task_priority(&mut self, priority: i32) {
        self.config.task_priority = priority;
    }

    /// Sets both inbound and outbound buffer sizes.
    pub fn set_max_packet_size(&mut self, size: i32) {
        self.set_max_in_packet_size(size);
        self.set_max_out_packet_size(size);
    }

    pub fn set_max_in_packet_size(&mut self, size: i32) {
        self.config.in_buffer_size = size;
    }

    pub fn set_max_out_packet_size(&mut self, size: i32) {
        self.config.out_buffer_size = size;
    }

    /// Keep-alive interval in seconds (30 by default).
    pub fn set_keep_alive(&mut self, secs: i32) {
        self.config.keep_alive_secs = secs;
    }

    /// Delay before an automatic reconnect, in milliseconds.
    pub fn set_reconnect_timeout(&mut self, ms: i32) {
        self.config.reconnect_timeout_ms = ms;
    }

    /// Abort a network operation after this many milliseconds.
    pub fn set_network_operation_timeout(&mut self, ms: i32) {
        self.config.network_timeout_ms = ms;
    }

    /// Must be set before the client is created.
    pub fn set_last_will_message(
        &mut self,
        topic: impl Into<String>,
        message: impl Into<String>,
        qos: QoS,
        retain: bool,
    ) {
        self.config.last_will = Some(LastWill::new(topic, message).qos(qos).retain(retain));
    }

    pub fn disable_clean_session(&mut self) {
        self.config.clean_session = false;
    }

    pub fn disable_auto_reconnect(&mut self) {
        self.config.auto_reconnect = false;
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn uri(&self) -> Option<&str> {
        self.config.uri.as_deref()
    }

    pub fn client_name(&self) -> Option<&str> {
        self.config.client_id.as_deref()
    }

    pub fn keep_alive_secs(&self) -> i32 {
        self.config.keep_alive_secs
    }

    /// Outbox size in bytes, or `None` before the client exists.
    pub fn outbox_size(&self) -> Option<usize> {
        self.handle.as_ref().map(|h| h.engine().outbox_size())
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_connected()
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.handle.as_ref().map(ConnectionHandle::id)
    }

    /// `Started` only while the engine's network task is running: a task
    /// that exited on its own reports `HandleCreated` again.
    pub fn lifecycle_state(&self) -> LifecycleState {
        match &self.handle {
            None => LifecycleState::NoHandle,
            Some(handle) if self.started && handle.engine().is_running() => {
                LifecycleState::Started
            }
            Some(_) => LifecycleState::HandleCreated,
        }
    }

    /// Log a decoded error detail, e.g. from inside an error callback.
    pub fn print_error(&self, detail: &ErrorDetail) {
        decoder::log_error(detail);
    }

    pub(crate) fn handle(&self) -> Option<&ConnectionHandle> {
        self.handle.as_ref()
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Create the engine connection from the current configuration and
    /// route all of its events through this client's dispatcher.
    ///
    /// Calling this again while a handle exists keeps the existing handle.
    pub fn create_client(&mut self) -> MqttResult<()> {
        tracing::debug!("MQTT client init");

        if let Some(handle) = &self.handle {
            tracing::warn!(client = %handle.id(), "MQTT client already created, reusing it");
            return Ok(());
        }

        let Some(uri) = self.config.uri.clone() else {
            tracing::error!("MQTT broker URI is not set, aborting connect");
            return Err(ConfigError::MissingBrokerUri.into());
        };

        let client = self
            .engine
            .init(&self.config)
            .inspect_err(|e| tracing::error!(error = %e, "MQTT client init failed"))?;
        let handle = ConnectionHandle::new(client);

        self.dispatcher.bind(
            handle.id(),
            handle.engine().supports_deleted_events(),
            SessionInfo {
                uri,
                client_name: self.config.client_id.clone(),
                username: self.config.username.clone(),
            },
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        let sink: EventSink = Arc::new(move |event: &EngineEvent<'_>| dispatcher.dispatch(event));
        if let Err(e) = handle.engine().register_event_sink(sink) {
            tracing::error!(error = %e, "MQTT client event registration failed");
            self.dispatcher.unbind();
            return Err(e.into());
        }

        tracing::debug!(client = %handle.id(), "MQTT client created");
        self.handle = Some(handle);
        Ok(())
    }

    /// Start the engine's network loop, creating the client first if needed.
    pub fn start(&mut self) -> MqttResult<()> {
        if self.handle.is_none() {
            tracing::debug!("MQTT client does not exist yet, creating it");
            self.create_client()?;
        }

        let handle = self.require_handle("start")?;
        log_result("start", handle.engine().start())?;
        self.started = true;
        Ok(())
    }

    /// Force a reconnection to the broker.
    pub fn reconnect(&mut self) -> MqttResult<()> {
        let handle = self.require_handle("reconnect")?;
        log_result("reconnect", handle.engine().reconnect())
    }

    /// Stop the network loop. The handle stays valid for a later `start()`.
    pub fn stop(&mut self) -> MqttResult<()> {
        let handle = self.require_handle("stop")?;
        log_result("stop", handle.engine().stop())?;
        self.started = false;
        Ok(())
    }

    /// Force a disconnection from the broker.
    pub fn disconnect(&mut self) -> MqttResult<()> {
        let handle = self.require_handle("disconnect")?;
        log_result("disconnect", handle.engine().disconnect())
    }

    fn require_handle(&self, op: &'static str) -> MqttResult<&ConnectionHandle> {
        self.handle.as_ref().ok_or_else(|| {
            tracing::error!(op, "MQTT client does not exist, use create_client() first");
            ConfigError::NoClient.into()
        })
    }
}

impl<E: Engine + Default> Default for MqttClient<E> {
    fn default() -> Self {
        Self::new(E::default())
    }
}

impl<E: Engine> Drop for MqttClient<E> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.dispatcher.unbind();
            drop(handle);
        }
    }
}

fn log_result(op: &'static str, result: EngineResult<()>) -> MqttResult<()> {
    match &result {
        Ok(()) => tracing::debug!(op, "MQTT client {op} succeeded"),
        Err(e) => tracing::error!(op, error = %e, "MQTT client {op} failed"),
    }
    Ok(result?)
}
