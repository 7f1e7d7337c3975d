//! Connection configuration record handed to the engine at client creation.

use std::net::Ipv4Addr;

use crate::event::QoS;

pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_SCHEME: &str = "mqtt";
pub const DEFAULT_BUFFER_SIZE: i32 = 1024;
pub const DEFAULT_KEEP_ALIVE_SECS: i32 = 30;
pub const DEFAULT_RECONNECT_TIMEOUT_MS: i32 = 10_000;
pub const DEFAULT_NETWORK_TIMEOUT_MS: i32 = 10_000;
pub const DEFAULT_TASK_PRIORITY: i32 = 5;

/// Last will message the broker publishes if this client vanishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub message: String,
    pub qos: QoS,
    pub retain: bool,
}

impl LastWill {
    pub fn new(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            message: message.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    pub fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Length of the will payload in bytes.
    pub fn message_len(&self) -> usize {
        self.message.len()
    }
}

/// Everything the engine needs to create a connection.
///
/// Values are stored as given. Sizes and timeouts are signed so that a
/// caller mistake (zero or negative) is kept and reported by the engine
/// at creation time rather than silently clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub uri: Option<String>,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Client certificate (PEM).
    pub client_cert: Option<Vec<u8>>,
    /// CA certificate used to verify the broker (PEM).
    pub ca_cert: Option<Vec<u8>>,
    /// Client private key (PEM).
    pub client_key: Option<Vec<u8>>,
    pub task_priority: i32,
    pub in_buffer_size: i32,
    pub out_buffer_size: i32,
    pub keep_alive_secs: i32,
    pub reconnect_timeout_ms: i32,
    pub network_timeout_ms: i32,
    pub last_will: Option<LastWill>,
    pub clean_session: bool,
    pub auto_reconnect: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: None,
            client_id: None,
            username: None,
            password: None,
            client_cert: None,
            ca_cert: None,
            client_key: None,
            task_priority: DEFAULT_TASK_PRIORITY,
            in_buffer_size: DEFAULT_BUFFER_SIZE,
            out_buffer_size: DEFAULT_BUFFER_SIZE,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            reconnect_timeout_ms: DEFAULT_RECONNECT_TIMEOUT_MS,
            network_timeout_ms: DEFAULT_NETWORK_TIMEOUT_MS,
            last_will: None,
            clean_session: true,
            auto_reconnect: true,
        }
    }
}

/// `scheme://host:port`
pub fn broker_url(host: &str, port: u16, scheme: &str) -> String {
    format!("{scheme}://{host}:{port}")
}

/// `scheme://a.b.c.d:port`
pub fn broker_ip(ip: Ipv4Addr, port: u16, scheme: &str) -> String {
    format!("{scheme}://{ip}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ConnectionConfig::default();
        assert!(config.uri.is_none());
        assert!(config.client_id.is_none());
        assert_eq!(config.in_buffer_size, 1024);
        assert_eq!(config.out_buffer_size, 1024);
        assert_eq!(config.keep_alive_secs, 30);
        assert!(config.clean_session);
        assert!(config.auto_reconnect);
        assert!(config.last_will.is_none());
    }

    #[test]
    fn url_from_host() {
        assert_eq!(broker_url("host", 1883, "mqtt"), "mqtt://host:1883");
        assert_eq!(
            broker_url("broker.example.com", 443, "wss"),
            "wss://broker.example.com:443"
        );
    }

    #[test]
    fn url_from_ip() {
        assert_eq!(
            broker_ip(Ipv4Addr::new(192, 168, 1, 100), 8883, "mqtts"),
            "mqtts://192.168.1.100:8883"
        );
    }

    #[test]
    fn last_will_builder() {
        let will = LastWill::new("devices/d1/status", "offline")
            .qos(QoS::AtLeastOnce)
            .retain(true);
        assert_eq!(will.topic, "devices/d1/status");
        assert_eq!(will.message_len(), 7);
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
    }
}
