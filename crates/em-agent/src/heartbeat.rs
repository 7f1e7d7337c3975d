//! Periodic heartbeat publisher.
//!
//! Publishes a small JSON status document at a configurable interval so
//! the backend knows the device is alive.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time;

use em_mqtt::{Engine, MqttClient, PublishOutcome, QoS};

#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub device_id: String,
    pub uptime_secs: u64,
    pub connected: bool,
    pub agent_version: String,
    pub timestamp: DateTime<Utc>,
}

impl Heartbeat {
    pub fn new(device_id: &str, uptime_secs: u64, connected: bool) -> Self {
        Self {
            device_id: device_id.to_string(),
            uptime_secs,
            connected,
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Publish one heartbeat at QoS 0.
pub fn publish<E: Engine>(client: &MqttClient<E>, topic: &str, heartbeat: &Heartbeat) -> PublishOutcome {
    let payload = match serde_json::to_vec(heartbeat) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize heartbeat");
            return PublishOutcome::Failed;
        }
    };
    client.publish(topic, payload, QoS::AtMostOnce, false)
}

/// Run the heartbeat loop, publishing at `interval`.
///
/// This function runs forever until the task is cancelled.
pub async fn run<E: Engine>(
    client: &MqttClient<E>,
    device_id: &str,
    topic: &str,
    interval: Duration,
    start_time: time::Instant,
) {
    let mut ticker = time::interval(interval);
    // Skip the first tick (fires immediately).
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if !client.is_connected() {
            tracing::debug!("not connected, skipping heartbeat");
            continue;
        }

        let heartbeat = Heartbeat::new(device_id, start_time.elapsed().as_secs(), true);
        if publish(client, topic, &heartbeat).is_accepted() {
            tracing::debug!(uptime_secs = heartbeat.uptime_secs, "heartbeat sent");
        } else {
            tracing::warn!(topic, "failed to publish heartbeat");
        }
    }
}
