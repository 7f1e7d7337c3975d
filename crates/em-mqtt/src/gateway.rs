//! Publish / subscribe pass-through to the engine.
//!
//! Every call returns a [`PublishOutcome`] whose code follows the engine
//! convention: message id (`>= 0`), `-1` generic failure, `-2` outbox full.
//! Without a client handle the call fails locally with `-1` and the engine
//! is not contacted.

use crate::client::MqttClient;
use crate::engine::{Engine, PublishOutcome};
use crate::event::QoS;

impl<E: Engine> MqttClient<E> {
    /// Publish from the caller's thread.
    ///
    /// Never waits for the network; when the engine cannot take the message
    /// right now the outcome is [`PublishOutcome::OutboxFull`]. Returns
    /// message id 0 for QoS 0; only QoS 1 and 2 produce a later
    /// publish-confirmed callback carrying the same id.
    ///
    /// Publishing while disconnected is attempted anyway (the engine may be
    /// mid-reconnect) and only logs a warning.
    pub fn publish(
        &self,
        topic: &str,
        payload: impl AsRef<[u8]>,
        qos: QoS,
        retain: bool,
    ) -> PublishOutcome {
        let payload = payload.as_ref();
        tracing::debug!(topic, len = payload.len(), qos = %qos, retain, "publishing message");

        if !self.is_connected() {
            tracing::warn!(topic, "MQTT client is not connected, the message may not be published");
        }

        let Some(handle) = self.handle() else {
            tracing::error!(topic, "MQTT client does not exist, can't publish");
            return PublishOutcome::Failed;
        };

        let outcome = PublishOutcome::from_code(handle.engine().publish(topic, payload, qos, retain));
        log_outcome("publish", topic, outcome);
        outcome
    }

    /// Hand the message to the engine's outbox; the network task sends it.
    ///
    /// Never blocks. With `store == false` and QoS 0 the engine may drop the
    /// message silently when the outbox is busy.
    pub fn enqueue(
        &self,
        topic: &str,
        payload: impl AsRef<[u8]>,
        qos: QoS,
        retain: bool,
        store: bool,
    ) -> PublishOutcome {
        let payload = payload.as_ref();
        tracing::debug!(topic, len = payload.len(), qos = %qos, retain, store, "enqueueing message");

        let Some(handle) = self.handle() else {
            tracing::error!(topic, "MQTT client does not exist, can't enqueue");
            return PublishOutcome::Failed;
        };

        let outcome =
            PublishOutcome::from_code(handle.engine().enqueue(topic, payload, qos, retain, store));
        log_outcome("enqueue", topic, outcome);
        outcome
    }

    pub fn subscribe(&self, topic: &str, qos: QoS) -> PublishOutcome {
        let Some(handle) = self.handle() else {
            tracing::error!(topic, "MQTT client does not exist, can't subscribe, use create_client() first");
            return PublishOutcome::Failed;
        };

        tracing::debug!(topic, qos = %qos, "subscribing");
        let outcome = PublishOutcome::from_code(handle.engine().subscribe(topic, qos));
        log_outcome("subscribe", topic, outcome);
        outcome
    }

    pub fn unsubscribe(&self, topic: &str) -> PublishOutcome {
        let Some(handle) = self.handle() else {
            tracing::error!(topic, "MQTT client does not exist, can't unsubscribe, use create_client() first");
            return PublishOutcome::Failed;
        };

        tracing::debug!(topic, "unsubscribing");
        let outcome = PublishOutcome::from_code(handle.engine().unsubscribe(topic));
        log_outcome("unsubscribe", topic, outcome);
        outcome
    }
}

fn log_outcome(op: &'static str, topic: &str, outcome: PublishOutcome) {
    match outcome {
        PublishOutcome::Accepted(msg_id) => tracing::debug!(op, topic, msg_id, "{op} accepted"),
        PublishOutcome::Failed => tracing::error!(op, topic, "{op} failed"),
        PublishOutcome::OutboxFull => tracing::error!(op, topic, "{op} failed, outbox full"),
    }
}

#[cfg(test)]
mod tests {
    use crate::client::MqttClient;
    use crate::engine::PublishOutcome;
    use crate::event::{ProtocolEvent, QoS};
    use crate::mock::{EngineCall, MockEngine};

    fn started() -> (MqttClient<MockEngine>, MockEngine) {
        let engine = MockEngine::new();
        let mut client = MqttClient::new(engine.clone());
        client.set_broker_uri("mqtt://localhost:1883");
        client.start().unwrap();
        (client, engine)
    }

    #[test]
    fn no_handle_fails_locally() {
        let engine = MockEngine::new();
        let client = MqttClient::new(engine.clone());

        assert_eq!(client.subscribe("a/b", QoS::AtLeastOnce).code(), -1);
        assert_eq!(client.unsubscribe("a/b").code(), -1);
        assert_eq!(client.publish("a/b", "x", QoS::AtMostOnce, false).code(), -1);
        assert_eq!(client.enqueue("a/b", "x", QoS::AtLeastOnce, false, true).code(), -1);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn publish_while_disconnected_is_still_attempted() {
        let (client, engine) = started();
        assert!(!client.is_connected());

        let outcome = client.publish("sensors/temp", "21.5", QoS::AtMostOnce, false);
        assert_eq!(outcome, PublishOutcome::Accepted(0));
        assert_eq!(
            engine.calls().last(),
            Some(&EngineCall::Publish {
                topic: "sensors/temp".into(),
                payload: b"21.5".to_vec(),
                qos: QoS::AtMostOnce,
                retain: false,
            })
        );
    }

    #[test]
    fn engine_codes_are_normalized() {
        let (client, engine) = started();
        engine.push_result(-2);
        engine.push_result(-1);
        engine.push_result(-7);

        assert_eq!(
            client.enqueue("t", "x", QoS::AtLeastOnce, false, true),
            PublishOutcome::OutboxFull
        );
        assert_eq!(client.subscribe("t", QoS::AtMostOnce), PublishOutcome::Failed);
        assert_eq!(client.unsubscribe("t"), PublishOutcome::Failed);
    }

    #[test]
    fn qos1_publish_id_matches_confirmation() {
        let (client, engine) = started();
        let confirmed = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = confirmed.clone();
        client.on_publish_confirmed(move |msg_id| sink.lock().unwrap().push(msg_id));

        engine.emit(ProtocolEvent::Connected {
            session_present: false,
        });
        let zero = client.publish("t", "a", QoS::AtMostOnce, false);
        let one = client.publish("t", "b", QoS::AtLeastOnce, false);
        engine.confirm_publishes();

        assert_eq!(zero.msg_id(), Some(0));
        let id = one.msg_id().unwrap();
        assert!(id > 0);
        assert_eq!(*confirmed.lock().unwrap(), vec![id]);
    }
}
