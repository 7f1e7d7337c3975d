//! Agent event loop: reacts to forwarded client events.
//!
//! Resubscribes on every fresh session, reassembles inbound messages and
//! logs decoded errors.

use em_mqtt::{Engine, MqttClient};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::assembler::{FragmentAssembler, InboundMessage};
use crate::config::Subscription;
use crate::events::AgentEvent;

/// Bytes of payload shown in the log line of a received message.
const PREVIEW_LEN: usize = 64;

/// Drain `events` until every sender is gone.
///
/// Intended to run inside `tokio::select!` next to the heartbeat loop.
pub async fn run<E: Engine>(
    client: &MqttClient<E>,
    mut events: UnboundedReceiver<AgentEvent>,
    subscriptions: &[Subscription],
) {
    let mut assembler = FragmentAssembler::default();
    while let Some(event) = events.recv().await {
        handle_event(client, &mut assembler, subscriptions, event);
    }
    tracing::warn!("agent event channel closed");
}

/// Handle one event. Returns a message when one completed.
pub fn handle_event<E: Engine>(
    client: &MqttClient<E>,
    assembler: &mut FragmentAssembler,
    subscriptions: &[Subscription],
    event: AgentEvent,
) -> Option<InboundMessage> {
    match event {
        AgentEvent::BeforeConnect => tracing::debug!("connecting to MQTT broker"),
        AgentEvent::Connected { session_present } => {
            tracing::info!(session_present, "MQTT connected");
            if !session_present {
                subscribe_all(client, subscriptions);
            }
        }
        AgentEvent::Disconnected => tracing::warn!("MQTT disconnected"),
        AgentEvent::Subscribed {
            msg_id,
            error,
            granted,
        } => {
            if granted.contains(&0x80) {
                tracing::warn!(msg_id, ?granted, "broker rejected a subscription");
            } else {
                tracing::info!(msg_id, ?error, ?granted, "subscription acknowledged");
            }
        }
        AgentEvent::Unsubscribed { msg_id } => tracing::info!(msg_id, "unsubscribed"),
        AgentEvent::Message(fragment) => {
            let message = assembler.push(fragment)?;
            let preview_len = message.payload.len().min(PREVIEW_LEN);
            tracing::info!(
                topic = %message.topic,
                msg_id = message.msg_id,
                len = message.payload.len(),
                qos = %message.qos,
                retain = message.retain,
                preview = %String::from_utf8_lossy(&message.payload[..preview_len]),
                "message received"
            );
            return Some(message);
        }
        AgentEvent::PublishConfirmed { msg_id } => tracing::debug!(msg_id, "publish confirmed"),
        AgentEvent::Deleted { msg_id } => {
            tracing::warn!(msg_id, "message expired from outbox before delivery")
        }
        AgentEvent::Error(detail) => client.print_error(&detail),
        AgentEvent::Custom { event_id } => tracing::debug!(event_id, "unhandled MQTT event"),
    }
    None
}

/// Subscribe to every configured filter. Returns how many were accepted.
pub fn subscribe_all<E: Engine>(client: &MqttClient<E>, subscriptions: &[Subscription]) -> usize {
    let mut accepted = 0;
    for sub in subscriptions {
        let outcome = client.subscribe(&sub.topic, sub.qos);
        if outcome.is_accepted() {
            accepted += 1;
        } else {
            tracing::warn!(topic = %sub.topic, code = outcome.code(), "subscribe failed");
        }
    }
    tracing::info!(accepted, total = subscriptions.len(), "MQTT subscriptions requested");
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Fragment;
    use em_mqtt::{EngineCall, MockEngine, QoS};

    fn subs() -> Vec<Subscription> {
        vec![
            Subscription {
                topic: "cmd/#".into(),
                qos: QoS::AtLeastOnce,
            },
            Subscription {
                topic: "cfg".into(),
                qos: QoS::AtMostOnce,
            },
        ]
    }

    fn started() -> (MqttClient<MockEngine>, MockEngine) {
        let engine = MockEngine::new();
        let mut client = MqttClient::new(engine.clone());
        client.set_broker_uri("mqtt://localhost:1883");
        client.start().unwrap();
        (client, engine)
    }

    #[test]
    fn fresh_session_resubscribes() {
        let (client, engine) = started();
        let mut asm = FragmentAssembler::default();
        handle_event(
            &client,
            &mut asm,
            &subs(),
            AgentEvent::Connected {
                session_present: false,
            },
        );
        assert_eq!(
            engine.subscriptions(),
            vec![
                ("cmd/#".to_string(), QoS::AtLeastOnce),
                ("cfg".to_string(), QoS::AtMostOnce)
            ]
        );
    }

    #[test]
    fn resumed_session_keeps_subscriptions() {
        let (client, engine) = started();
        let mut asm = FragmentAssembler::default();
        handle_event(
            &client,
            &mut asm,
            &subs(),
            AgentEvent::Connected {
                session_present: true,
            },
        );
        assert_eq!(engine.count(|c| matches!(c, EngineCall::Subscribe { .. })), 0);
    }

    #[test]
    fn subscribe_all_counts_failures() {
        let (client, engine) = started();
        engine.push_result(-1);
        assert_eq!(subscribe_all(&client, &subs()), 1);
    }

    #[test]
    fn fragments_complete_a_message() {
        let (client, _) = started();
        let mut asm = FragmentAssembler::default();
        let first = Fragment {
            msg_id: 2,
            topic: "cmd/update".into(),
            data: b"{\"v\":".to_vec(),
            offset: 0,
            total_len: 7,
            qos: QoS::AtLeastOnce,
            retain: false,
        };
        let second = Fragment {
            topic: String::new(),
            data: b"1}".to_vec(),
            offset: 5,
            ..first.clone()
        };
        assert!(handle_event(&client, &mut asm, &[], AgentEvent::Message(first)).is_none());
        let msg = handle_event(&client, &mut asm, &[], AgentEvent::Message(second)).unwrap();
        assert_eq!(msg.topic, "cmd/update");
        assert_eq!(msg.payload, b"{\"v\":1}");
    }
}
