//! Callback-driven MQTT client facade for embedded devices.
//!
//! Wraps a protocol engine behind a small setter / lifecycle / callback API:
//! - `MqttClient` for configuration, lifecycle and publish/subscribe
//! - `Engine` / `EngineClient` traits as the seam to the protocol engine
//! - `RumqttEngine` for production over `rumqttc`
//! - `MockEngine` for testing without a broker
//! - `MqttSettings` for TOML-driven configuration
//! - `decoder` for human-readable error diagnostics

pub mod callbacks;
pub mod client;
pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod event;
mod gateway;
pub mod handle;
pub mod mock;
pub mod rumqtt;
pub mod settings;
pub mod tls;

// Re-exports for convenience.
pub use callbacks::{Callback, EventKind};
pub use client::{LifecycleState, MqttClient};
pub use config::{ConnectionConfig, LastWill};
pub use decoder::{ErrorDescription, describe};
pub use engine::{ClientId, Engine, EngineClient, EventSink, PublishOutcome};
pub use error::{ConfigError, EngineError, EngineResult, MqttError, MqttResult};
pub use event::{
    ConnectReturnCode, EngineEvent, ErrorDetail, ErrorKind, MessageFragment, ProtocolEvent, QoS,
};
pub use handle::ConnectionHandle;
pub use mock::{EngineCall, MockEngine, MockOp};
pub use rumqtt::RumqttEngine;
pub use settings::{LastWillSettings, MqttSettings};
