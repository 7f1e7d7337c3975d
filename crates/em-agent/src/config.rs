//! Agent configuration, loadable from TOML.

use em_mqtt::{MqttSettings, QoS};
use serde::Deserialize;

/// Top-level configuration for the device agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Unique device identifier.
    pub device_id: String,
    /// MQTT client settings.
    pub mqtt: MqttSettings,
    /// Topic filters subscribed on every fresh session.
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    /// Heartbeat topic. Defaults to `devices/{device_id}/heartbeat`.
    #[serde(default)]
    pub heartbeat_topic: Option<String>,
    /// Heartbeat interval in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Subscription {
    pub topic: String,
    #[serde(default)]
    pub qos: QoS,
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl AgentConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        anyhow::ensure!(
            config.heartbeat_interval_secs > 0,
            "heartbeat_interval_secs must be positive"
        );
        Ok(config)
    }

    pub fn heartbeat_topic(&self) -> String {
        self.heartbeat_topic
            .clone()
            .unwrap_or_else(|| format!("devices/{}/heartbeat", self.device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_config() {
        let toml = r#"
device_id = "sensor-001"

[mqtt]
broker_uri = "mqtt://broker.local:1883"
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.device_id, "sensor-001");
        assert_eq!(config.heartbeat_interval_secs, 30); // default
        assert!(config.subscriptions.is_empty());
        assert_eq!(config.heartbeat_topic(), "devices/sensor-001/heartbeat");
        assert_eq!(config.mqtt.keep_alive_secs, 30);
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
device_id = "gw-042"
heartbeat_topic = "fleet/gw-042/alive"
heartbeat_interval_secs = 15

[mqtt]
broker_host = "broker.example.com"
broker_port = 8883
scheme = "mqtts"
client_name = "gw-042"
ca_cert_path = "/certs/ca.pem"
keep_alive_secs = 60

[[subscriptions]]
topic = "devices/gw-042/cmd/#"
qos = 1

[[subscriptions]]
topic = "broadcast/config"
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.heartbeat_topic(), "fleet/gw-042/alive");
        assert_eq!(config.heartbeat_interval_secs, 15);
        assert_eq!(config.mqtt.broker_port, 8883);
        assert_eq!(config.mqtt.ca_cert_path.as_deref(), Some("/certs/ca.pem"));
        assert_eq!(
            config.subscriptions,
            vec![
                Subscription {
                    topic: "devices/gw-042/cmd/#".into(),
                    qos: QoS::AtLeastOnce,
                },
                Subscription {
                    topic: "broadcast/config".into(),
                    qos: QoS::AtMostOnce,
                },
            ]
        );
    }

    #[test]
    fn invalid_subscription_qos_is_rejected() {
        let toml = r#"
device_id = "x"

[mqtt]
broker_uri = "mqtt://a"

[[subscriptions]]
topic = "t"
qos = 7
"#;
        assert!(toml::from_str::<AgentConfig>(toml).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(AgentConfig::from_file("/nonexistent/agent.toml").is_err());
    }
}
