//! Reassembly of inbound messages delivered in fragments.
//!
//! The client hands over messages longer than its inbound buffer as a run
//! of fragments sharing a msg id. Fragments of one message arrive in order;
//! a gap (or a new first fragment for the same id) discards the partial
//! message.

use std::collections::HashMap;

use em_mqtt::QoS;

use crate::events::Fragment;

/// Upper bound on a reassembled message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// A complete inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub msg_id: i32,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug)]
struct Partial {
    topic: String,
    payload: Vec<u8>,
    total_len: usize,
    qos: QoS,
    retain: bool,
}

#[derive(Debug)]
pub struct FragmentAssembler {
    partial: HashMap<i32, Partial>,
    max_message_size: usize,
}

impl FragmentAssembler {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            partial: HashMap::new(),
            max_message_size,
        }
    }

    /// Number of messages still waiting for fragments.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Feed one fragment. Returns the message once its last fragment is in.
    pub fn push(&mut self, fragment: Fragment) -> Option<InboundMessage> {
        if fragment.total_len > self.max_message_size {
            tracing::warn!(
                msg_id = fragment.msg_id,
                total_len = fragment.total_len,
                limit = self.max_message_size,
                "inbound message too large, dropping"
            );
            self.partial.remove(&fragment.msg_id);
            return None;
        }

        if fragment.offset == 0 {
            if self.partial.remove(&fragment.msg_id).is_some() {
                tracing::warn!(msg_id = fragment.msg_id, "restarted message discards partial data");
            }
            if fragment.data.len() >= fragment.total_len {
                return Some(InboundMessage {
                    msg_id: fragment.msg_id,
                    topic: fragment.topic,
                    payload: fragment.data,
                    qos: fragment.qos,
                    retain: fragment.retain,
                });
            }
            let mut payload = Vec::with_capacity(fragment.total_len);
            payload.extend_from_slice(&fragment.data);
            self.partial.insert(
                fragment.msg_id,
                Partial {
                    topic: fragment.topic,
                    payload,
                    total_len: fragment.total_len,
                    qos: fragment.qos,
                    retain: fragment.retain,
                },
            );
            return None;
        }

        let Some(partial) = self.partial.get_mut(&fragment.msg_id) else {
            tracing::warn!(
                msg_id = fragment.msg_id,
                offset = fragment.offset,
                "continuation fragment without a first fragment, dropping"
            );
            return None;
        };
        if fragment.offset != partial.payload.len() || fragment.total_len != partial.total_len {
            tracing::warn!(
                msg_id = fragment.msg_id,
                expected = partial.payload.len(),
                offset = fragment.offset,
                "fragment out of sequence, dropping message"
            );
            self.partial.remove(&fragment.msg_id);
            return None;
        }

        partial.payload.extend_from_slice(&fragment.data);
        if partial.payload.len() < partial.total_len {
            return None;
        }

        let partial = self.partial.remove(&fragment.msg_id)?;
        Some(InboundMessage {
            msg_id: fragment.msg_id,
            topic: partial.topic,
            payload: partial.payload,
            qos: partial.qos,
            retain: partial.retain,
        })
    }
}

impl Default for FragmentAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}
