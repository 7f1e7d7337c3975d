//! Bridge from client callbacks to the agent's async main loop.
//!
//! Callbacks run on the engine's network thread and only see borrowed
//! views, so each one copies what it needs into an owned [`AgentEvent`]
//! and sends it over an unbounded channel.

use em_mqtt::{Engine, EngineEvent, ErrorDetail, ErrorKind, MessageFragment, MqttClient, QoS};
use tokio::sync::mpsc::UnboundedSender;

/// Owned copy of one inbound message fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub msg_id: i32,
    /// Empty on continuation fragments.
    pub topic: String,
    pub data: Vec<u8>,
    pub offset: usize,
    pub total_len: usize,
    pub qos: QoS,
    pub retain: bool,
}

impl From<&MessageFragment<'_>> for Fragment {
    fn from(f: &MessageFragment<'_>) -> Self {
        Self {
            msg_id: f.msg_id,
            topic: f.topic.to_string(),
            data: f.data.to_vec(),
            offset: f.offset,
            total_len: f.total_len,
            qos: f.qos,
            retain: f.retain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    BeforeConnect,
    Connected { session_present: bool },
    Disconnected,
    Subscribed {
        msg_id: i32,
        error: ErrorKind,
        granted: Vec<u8>,
    },
    Unsubscribed { msg_id: i32 },
    Message(Fragment),
    PublishConfirmed { msg_id: i32 },
    Deleted { msg_id: i32 },
    Error(ErrorDetail),
    Custom { event_id: i32 },
}

/// Register all ten callbacks on `client`, each forwarding to `tx`.
pub fn register<E: Engine>(client: &MqttClient<E>, tx: UnboundedSender<AgentEvent>) {
    let sender = tx.clone();
    client.on_before_connect(move || forward(&sender, AgentEvent::BeforeConnect));

    let sender = tx.clone();
    client.on_connected(move |session_present| {
        forward(&sender, AgentEvent::Connected { session_present })
    });

    let sender = tx.clone();
    client.on_disconnected(move || forward(&sender, AgentEvent::Disconnected));

    let sender = tx.clone();
    client.on_subscribed(move |msg_id, error, data| {
        forward(
            &sender,
            AgentEvent::Subscribed {
                msg_id,
                error,
                granted: data.to_vec(),
            },
        )
    });

    let sender = tx.clone();
    client.on_unsubscribed(move |msg_id| forward(&sender, AgentEvent::Unsubscribed { msg_id }));

    let sender = tx.clone();
    client.on_message_received(move |fragment| {
        forward(&sender, AgentEvent::Message(Fragment::from(fragment)))
    });

    let sender = tx.clone();
    client.on_publish_confirmed(move |msg_id| {
        forward(&sender, AgentEvent::PublishConfirmed { msg_id })
    });

    let sender = tx.clone();
    client.on_message_deleted(move |msg_id| forward(&sender, AgentEvent::Deleted { msg_id }));

    let sender = tx.clone();
    client.on_error(move |detail| forward(&sender, AgentEvent::Error(*detail)));

    client.on_custom_event(move |event: &EngineEvent<'_>| {
        forward(
            &tx,
            AgentEvent::Custom {
                event_id: event.event.event_id(),
            },
        )
    });
}

fn forward(tx: &UnboundedSender<AgentEvent>, event: AgentEvent) {
    if tx.send(event).is_err() {
        tracing::trace!("agent event loop gone, dropping event");
    }
}
