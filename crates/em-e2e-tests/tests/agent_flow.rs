//! E2E tests driving the device agent's event loop over a mock engine.

use em_agent::assembler::{FragmentAssembler, InboundMessage};
use em_agent::config::{AgentConfig, Subscription};
use em_agent::events::{self, AgentEvent};
use em_agent::{heartbeat, mqtt_loop};
use em_mqtt::{EngineCall, EventKind, MockEngine, MqttClient, ProtocolEvent, QoS};
use tokio::sync::mpsc;

fn agent_config() -> AgentConfig {
    toml::from_str(
        r#"
device_id = "dev-9"

[mqtt]
broker_uri = "mqtt://broker.test:1883"
in_buffer_size = 4

[[subscriptions]]
topic = "devices/dev-9/cmd/#"
qos = 1
"#,
    )
    .unwrap()
}

fn agent_client(config: &AgentConfig) -> (MqttClient<MockEngine>, MockEngine) {
    let engine = MockEngine::new();
    let mut client = MqttClient::new(engine.clone());
    config.mqtt.apply(&mut client).unwrap();
    (client, engine)
}

/// Run every queued agent event through the loop's handler.
fn drain(
    client: &MqttClient<MockEngine>,
    rx: &mut mpsc::UnboundedReceiver<AgentEvent>,
    subscriptions: &[Subscription],
) -> Vec<InboundMessage> {
    let mut assembler = FragmentAssembler::default();
    let mut messages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Some(message) = mqtt_loop::handle_event(client, &mut assembler, subscriptions, event) {
            messages.push(message);
        }
    }
    messages
}

/// Connect, resubscribe, receive a fragmented command and reassemble it.
#[test]
fn e2e_agent_connects_subscribes_and_reassembles() {
    let config = agent_config();
    let (mut client, engine) = agent_client(&config);
    let (tx, mut rx) = mpsc::unbounded_channel();
    events::register(&client, tx);
    client.start().unwrap();
    assert_eq!(engine.last_config().unwrap().in_buffer_size, 4);

    engine.emit(ProtocolEvent::BeforeConnect);
    engine.emit(ProtocolEvent::Connected {
        session_present: false,
    });
    engine.deliver_fragmented(3, "devices/dev-9/cmd/reboot", b"{\"delay\":5}", QoS::AtLeastOnce, 4);

    let messages = drain(&client, &mut rx, &config.subscriptions);

    assert_eq!(
        engine.subscriptions(),
        vec![("devices/dev-9/cmd/#".to_string(), QoS::AtLeastOnce)]
    );
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, "devices/dev-9/cmd/reboot");
    assert_eq!(messages[0].payload, b"{\"delay\":5}");
    assert_eq!(messages[0].msg_id, 3);
}

/// The agent resubscribes after a reconnect without a stored session.
#[test]
fn e2e_agent_resubscribes_after_reconnect() {
    let config = agent_config();
    let (mut client, engine) = agent_client(&config);
    let (tx, mut rx) = mpsc::unbounded_channel();
    events::register(&client, tx);
    client.start().unwrap();

    engine.emit(ProtocolEvent::Connected {
        session_present: false,
    });
    engine.emit(ProtocolEvent::Disconnected);
    engine.emit(ProtocolEvent::Connected {
        session_present: true,
    });
    engine.emit(ProtocolEvent::Disconnected);
    engine.emit(ProtocolEvent::Connected {
        session_present: false,
    });

    drain(&client, &mut rx, &config.subscriptions);

    // First and third sessions are fresh; the second resumed.
    assert_eq!(
        engine.count(|c| matches!(c, EngineCall::Subscribe { .. })),
        2
    );
}

/// Subscriptions configured in TOML reach the engine with their QoS.
#[test]
fn e2e_subscribe_all_from_config() {
    let config = agent_config();
    let (mut client, engine) = agent_client(&config);
    client.start().unwrap();

    let extra = Subscription {
        topic: "broadcast".into(),
        qos: QoS::AtMostOnce,
    };
    let mut subs = config.subscriptions.clone();
    subs.push(extra);

    assert_eq!(mqtt_loop::subscribe_all(&client, &subs), 2);
    assert_eq!(engine.subscriptions().len(), 2);
}

/// Heartbeats are JSON on the configured topic at QoS 0.
#[test]
fn e2e_heartbeat_payload() {
    let config = agent_config();
    let (mut client, engine) = agent_client(&config);
    client.start().unwrap();

    let hb = heartbeat::Heartbeat::new(&config.device_id, 12, true);
    let outcome = heartbeat::publish(&client, &config.heartbeat_topic(), &hb);
    assert!(outcome.is_accepted());

    let Some(EngineCall::Publish { topic, payload, qos, retain }) = engine.calls().last().cloned()
    else {
        panic!("expected a publish");
    };
    assert_eq!(topic, "devices/dev-9/heartbeat");
    assert_eq!(qos, QoS::AtMostOnce);
    assert!(!retain);
    let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(json["device_id"], "dev-9");
    assert_eq!(json["uptime_secs"], 12);
}

/// The async loop ends once every callback holding a sender is gone.
#[tokio::test]
async fn e2e_agent_loop_ends_when_callbacks_cleared() {
    let config = agent_config();
    let (mut client, engine) = agent_client(&config);
    let (tx, rx) = mpsc::unbounded_channel();
    events::register(&client, tx);
    client.start().unwrap();
    engine.emit(ProtocolEvent::Connected {
        session_present: false,
    });

    let shutdown = async {
        for kind in EventKind::ALL {
            client.clear_callback(kind);
        }
    };
    tokio::join!(mqtt_loop::run(&client, rx, &config.subscriptions), shutdown);

    assert_eq!(engine.subscriptions().len(), 1);
}
