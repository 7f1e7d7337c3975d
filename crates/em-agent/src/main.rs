//! Device agent: keeps an MQTT session to the broker, publishes
//! heartbeats and handles inbound messages.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use em_agent::config::AgentConfig;
use em_agent::{events, heartbeat, mqtt_loop};
use em_mqtt::{MqttClient, RumqttEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "em-agent starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/em-agent/agent.toml".to_string());

    let config = AgentConfig::from_file(&config_path)?;
    tracing::info!(device_id = %config.device_id, "config loaded");

    // ── MQTT client ─────────────────────────────────────────────
    let mut client = MqttClient::new(RumqttEngine::new());
    config.mqtt.apply(&mut client)?;

    let (tx, rx) = mpsc::unbounded_channel();
    events::register(&client, tx);
    client.start()?;

    let start_time = tokio::time::Instant::now();
    let heartbeat_topic = config.heartbeat_topic();

    tracing::info!("em-agent ready");

    tokio::select! {
        () = mqtt_loop::run(&client, rx, &config.subscriptions) => {
            tracing::error!("MQTT event loop exited unexpectedly");
        }
        () = heartbeat::run(
            &client,
            &config.device_id,
            &heartbeat_topic,
            Duration::from_secs(config.heartbeat_interval_secs),
            start_time,
        ) => {
            tracing::error!("heartbeat loop exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    // ── Shutdown ────────────────────────────────────────────────
    if let Err(e) = client.disconnect() {
        tracing::warn!(error = %e, "MQTT disconnect failed");
    }
    if let Err(e) = client.stop() {
        tracing::warn!(error = %e, "MQTT stop failed");
    }

    tracing::info!("em-agent stopped");
    Ok(())
}
