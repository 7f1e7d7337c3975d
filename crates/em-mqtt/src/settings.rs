//! Declarative client settings, loadable from TOML.

use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::client::MqttClient;
use crate::config::{
    DEFAULT_BUFFER_SIZE, DEFAULT_KEEP_ALIVE_SECS, DEFAULT_NETWORK_TIMEOUT_MS, DEFAULT_PORT,
    DEFAULT_RECONNECT_TIMEOUT_MS, DEFAULT_SCHEME, DEFAULT_TASK_PRIORITY,
};
use crate::engine::Engine;
use crate::error::{ConfigError, MqttResult};
use crate::event::QoS;

/// Every client setter as a deserializable record.
///
/// The broker is given as exactly one of `broker_uri`, `broker_host`
/// (with `broker_port` and `scheme`) or `broker_ip`.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    /// Full broker URI, e.g. `mqtts://broker.example.com:8883`.
    #[serde(default)]
    pub broker_uri: Option<String>,
    #[serde(default)]
    pub broker_host: Option<String>,
    #[serde(default)]
    pub broker_ip: Option<Ipv4Addr>,
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// One of mqtt, mqtts, ws, wss.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// MQTT client identifier. Engine default when unset.
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Path to the CA certificate used to verify the broker (PEM).
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    /// Path to the client certificate (PEM).
    #[serde(default)]
    pub client_cert_path: Option<String>,
    /// Path to the client private key (PEM).
    #[serde(default)]
    pub client_key_path: Option<String>,
    #[serde(default = "default_task_priority")]
    pub task_priority: i32,
    /// Overrides both buffer sizes when set.
    #[serde(default)]
    pub max_packet_size: Option<i32>,
    #[serde(default = "default_buffer_size")]
    pub in_buffer_size: i32,
    #[serde(default = "default_buffer_size")]
    pub out_buffer_size: i32,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: i32,
    #[serde(default = "default_reconnect_timeout")]
    pub reconnect_timeout_ms: i32,
    #[serde(default = "default_network_timeout")]
    pub network_timeout_ms: i32,
    #[serde(default)]
    pub last_will: Option<LastWillSettings>,
    #[serde(default = "default_true")]
    pub clean_session: bool,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastWillSettings {
    pub topic: String,
    pub message: String,
    /// QoS level 0, 1 or 2.
    #[serde(default)]
    pub qos: QoS,
    #[serde(default)]
    pub retain: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_task_priority() -> i32 {
    DEFAULT_TASK_PRIORITY
}

fn default_buffer_size() -> i32 {
    DEFAULT_BUFFER_SIZE
}

fn default_keep_alive() -> i32 {
    DEFAULT_KEEP_ALIVE_SECS
}

fn default_reconnect_timeout() -> i32 {
    DEFAULT_RECONNECT_TIMEOUT_MS
}

fn default_network_timeout() -> i32 {
    DEFAULT_NETWORK_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

impl MqttSettings {
    /// Settings pointing at `uri`, everything else at its default.
    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self {
            broker_uri: Some(uri.into()),
            broker_host: None,
            broker_ip: None,
            broker_port: DEFAULT_PORT,
            scheme: default_scheme(),
            client_name: None,
            username: None,
            password: None,
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
            task_priority: DEFAULT_TASK_PRIORITY,
            max_packet_size: None,
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

    /// Push every setting into `client` through its setters.
    ///
    /// Certificate files are read here; a missing or unreadable file is a
    /// [`ConfigError::Certificate`] naming it.
    pub fn apply<E: Engine>(&self, client: &mut MqttClient<E>) -> MqttResult<()> {
        self.apply_broker(client)?;

        if let Some(name) = &self.client_name {
            client.set_client_name(name.as_str());
        }
        match (&self.username, &self.password) {
            (Some(user), password) => {
                client.set_credentials(user.as_str(), password.as_deref().unwrap_or(""))
            }
            (None, Some(_)) => {
                return Err(ConfigError::Settings("password given without username".into()).into());
            }
            (None, None) => {}
        }

        if let Some(path) = &self.ca_cert_path {
            client.set_ca_cert(read_pem("CA certificate", path)?);
        }
        if let Some(path) = &self.client_cert_path {
            client.set_client_cert(read_pem("client certificate", path)?);
        }
        if let Some(path) = &self.client_key_path {
            client.set_auth_key(read_pem("client key", path)?);
        }

        client.set_task_priority(self.task_priority);
        client.set_max_in_packet_size(self.in_buffer_size);
        client.set_max_out_packet_size(self.out_buffer_size);
        if let Some(size) = self.max_packet_size {
            client.set_max_packet_size(size);
        }
        client.set_keep_alive(self.keep_alive_secs);
        client.set_reconnect_timeout(self.reconnect_timeout_ms);
        client.set_network_operation_timeout(self.network_timeout_ms);

        if let Some(will) = &self.last_will {
            client.set_last_will_message(
                will.topic.as_str(),
                will.message.as_str(),
                will.qos,
                will.retain,
            );
        }
        if !self.clean_session {
            client.disable_clean_session();
        }
        if !self.auto_reconnect {
            client.disable_auto_reconnect();
        }
        Ok(())
    }

    fn apply_broker<E: Engine>(&self, client: &mut MqttClient<E>) -> MqttResult<()> {
        match (&self.broker_uri, &self.broker_host, &self.broker_ip) {
            (Some(uri), None, None) => client.set_broker_uri(uri.as_str()),
            (None, Some(host), None) => client.set_broker_url(host, self.broker_port, &self.scheme),
            (None, None, Some(ip)) => client.set_broker_ip(*ip, self.broker_port, &self.scheme),
            (None, None, None) => return Err(ConfigError::MissingBrokerUri.into()),
            _ => {
                return Err(ConfigError::Settings(
                    "set only one of broker_uri, broker_host, broker_ip".into(),
                )
                .into());
            }
        }
        Ok(())
    }
}

fn read_pem(what: &'static str, path: &str) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|e| ConfigError::Certificate {
        what,
        path: path.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MqttError;
    use crate::mock::MockEngine;

    fn applied(toml: &str) -> MqttResult<MqttClient<MockEngine>> {
        let settings: MqttSettings = toml::from_str(toml).unwrap();
        let mut client = MqttClient::new(MockEngine::new());
        settings.apply(&mut client)?;
        Ok(client)
    }

    #[test]
    fn minimal_settings_use_defaults() {
        let client = applied(r#"broker_uri = "mqtt://broker.local:1883""#).unwrap();
        let config = client.config();
        assert_eq!(config.uri.as_deref(), Some("mqtt://broker.local:1883"));
        assert_eq!(config.keep_alive_secs, 30);
        assert_eq!(config.in_buffer_size, 1024);
        assert_eq!(config.reconnect_timeout_ms, 10_000);
        assert!(config.clean_session);
        assert!(config.auto_reconnect);
        assert!(config.client_id.is_none());
    }

    #[test]
    fn host_and_ip_forms() {
        let client = applied(
            r#"
broker_host = "broker.example.com"
broker_port = 8883
scheme = "mqtts"
"#,
        )
        .unwrap();
        assert_eq!(client.uri(), Some("mqtts://broker.example.com:8883"));

        let client = applied(r#"broker_ip = "10.1.2.3""#).unwrap();
        assert_eq!(client.uri(), Some("mqtt://10.1.2.3:1883"));
    }

    #[test]
    fn full_settings() {
        let client = applied(
            r#"
broker_uri = "mqtt://broker.local"
client_name = "sensor-7"
username = "dev"
password = "secret"
max_packet_size = 4096
keep_alive_secs = 60
clean_session = false
auto_reconnect = false

[last_will]
topic = "devices/sensor-7/status"
message = "offline"
qos = 1
retain = true
"#,
        )
        .unwrap();
        let config = client.config();
        assert_eq!(client.client_name(), Some("sensor-7"));
        assert_eq!(config.username.as_deref(), Some("dev"));
        assert_eq!(config.in_buffer_size, 4096);
        assert_eq!(config.out_buffer_size, 4096);
        assert_eq!(config.keep_alive_secs, 60);
        assert!(!config.clean_session);
        assert!(!config.auto_reconnect);
        let will = config.last_will.as_ref().unwrap();
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
    }

    #[test]
    fn missing_broker_is_rejected() {
        let err = applied(r#"client_name = "x""#).err().unwrap();
        assert_eq!(err, MqttError::from(ConfigError::MissingBrokerUri));
    }

    #[test]
    fn ambiguous_broker_is_rejected() {
        let err = applied(
            r#"
broker_uri = "mqtt://a"
broker_host = "b"
"#,
        )
        .err()
        .unwrap();
        assert!(matches!(err, MqttError::Config(ConfigError::Settings(_))));
    }

    #[test]
    fn bad_will_qos_is_rejected() {
        let parsed = toml::from_str::<MqttSettings>(
            r#"
broker_uri = "mqtt://a"
[last_will]
topic = "t"
message = "m"
qos = 3
"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn unreadable_certificate_names_file() {
        let err = applied(
            r#"
broker_uri = "mqtts://a"
ca_cert_path = "/nonexistent/ca.pem"
"#,
        )
        .err()
        .unwrap();
        match err {
            MqttError::Config(ConfigError::Certificate { what, path, .. }) => {
                assert_eq!(what, "CA certificate");
                assert_eq!(path, "/nonexistent/ca.pem");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn with_uri_matches_serde_defaults() {
        let from_toml: MqttSettings = toml::from_str(r#"broker_uri = "mqtt://x""#).unwrap();
        let built = MqttSettings::with_uri("mqtt://x");
        assert_eq!(format!("{from_toml:?}"), format!("{built:?}"));
    }
}
