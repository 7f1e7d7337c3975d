//! MQTT facade error types.

use thiserror::Error;

/// Failures detected locally, before any engine primitive is called.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("broker URI is not set, use set_broker_uri/url/ip first")]
    MissingBrokerUri,

    #[error("client handle does not exist, use create_client() first")]
    NoClient,

    #[error("failed to read {what} '{path}': {message}")]
    Certificate {
        what: &'static str,
        path: String,
        message: String,
    },

    #[error("invalid settings: {0}")]
    Settings(String),
}

/// Non-success status reported by the underlying protocol engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine rejected configuration: {0}")]
    Init(String),

    #[error("event registration failed: {0}")]
    Register(String),

    #[error("{op} failed with status {code}")]
    Status { op: &'static str, code: i32 },

    #[error("{op} not possible: {reason}")]
    InvalidState { op: &'static str, reason: String },
}

/// Errors returned by lifecycle operations of the facade.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MqttError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Convenience alias for facade results.
pub type MqttResult<T> = Result<T, MqttError>;

/// Convenience alias for engine primitive results.
pub type EngineResult<T> = Result<T, EngineError>;
