//! Protocol events emitted by the engine and the error details they carry.
//!
//! Every payload here is a borrowed view into engine-owned buffers. The
//! views are valid only for the duration of one dispatch; a callback that
//! needs the bytes later must copy them before returning.

use std::fmt;

use serde::Deserialize;

use crate::engine::ClientId;

/// MQTT quality-of-service level. Deserializes from the numeric level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize)]
#[serde(try_from = "u8")]
pub enum QoS {
    /// At most once (0).
    #[default]
    AtMostOnce,
    /// At least once (1).
    AtLeastOnce,
    /// Exactly once (2).
    ExactlyOnce,
}

impl QoS {
    /// Numeric level as used on the wire.
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = u8;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(other),
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

// ── Error details ─────────────────────────────────────────────

/// Return code of a CONNACK, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted,
    ProtocolRefused,
    IdRejected,
    ServerUnavailable,
    BadCredentials,
    NotAuthorized,
    /// A code outside the MQTT 3.1.1 range, kept verbatim.
    Unknown(i32),
}

impl ConnectReturnCode {
    /// Map a raw return code. Never fails: out-of-range codes become `Unknown`.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => ConnectReturnCode::Accepted,
            1 => ConnectReturnCode::ProtocolRefused,
            2 => ConnectReturnCode::IdRejected,
            3 => ConnectReturnCode::ServerUnavailable,
            4 => ConnectReturnCode::BadCredentials,
            5 => ConnectReturnCode::NotAuthorized,
            other => ConnectReturnCode::Unknown(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            ConnectReturnCode::Accepted => 0,
            ConnectReturnCode::ProtocolRefused => 1,
            ConnectReturnCode::IdRejected => 2,
            ConnectReturnCode::ServerUnavailable => 3,
            ConnectReturnCode::BadCredentials => 4,
            ConnectReturnCode::NotAuthorized => 5,
            ConnectReturnCode::Unknown(raw) => raw,
        }
    }
}

/// Tag of an [`ErrorDetail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    None,
    TransportError,
    ConnectionRefused,
    /// Kind not known to this facade, with its raw numeric tag.
    Unknown(i32),
}

impl ErrorKind {
    pub fn raw(self) -> i32 {
        match self {
            ErrorKind::None => 0,
            ErrorKind::TransportError => 1,
            ErrorKind::ConnectionRefused => 2,
            ErrorKind::Unknown(raw) => raw,
        }
    }
}

/// Error detail attached to Error (and Subscribed) events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorDetail {
    #[default]
    None,
    TransportError {
        /// Last error code reported by the TLS library.
        tls_last_error: i32,
        /// Last error number of the TLS stack.
        tls_stack_error: i32,
        /// Last captured socket errno of the transport.
        sock_errno: i32,
    },
    ConnectionRefused {
        code: ConnectReturnCode,
    },
    Unknown {
        raw_kind: i32,
    },
}

impl ErrorDetail {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorDetail::None => ErrorKind::None,
            ErrorDetail::TransportError { .. } => ErrorKind::TransportError,
            ErrorDetail::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            ErrorDetail::Unknown { raw_kind } => ErrorKind::Unknown(*raw_kind),
        }
    }

    /// Transport error carrying only a socket errno.
    pub fn transport(sock_errno: i32) -> Self {
        ErrorDetail::TransportError {
            tls_last_error: 0,
            tls_stack_error: 0,
            sock_errno,
        }
    }

    pub fn refused(code: ConnectReturnCode) -> Self {
        ErrorDetail::ConnectionRefused { code }
    }
}

// ── Events ────────────────────────────────────────────────────

/// One fragment of an inbound PUBLISH.
///
/// A message longer than the inbound buffer is delivered as several
/// fragments sharing `msg_id`, each with a larger `offset`. The last
/// fragment satisfies `offset + data.len() == total_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFragment<'a> {
    pub msg_id: i32,
    /// Topic of the message. Empty on continuation fragments.
    pub topic: &'a str,
    pub data: &'a [u8],
    pub offset: usize,
    pub total_len: usize,
    pub retain: bool,
    pub qos: QoS,
    pub dup: bool,
}

impl MessageFragment<'_> {
    /// True when this fragment completes the message.
    pub fn is_last(&self) -> bool {
        self.offset + self.data.len() >= self.total_len
    }
}

/// Low-level event emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolEvent<'a> {
    BeforeConnect,
    Connected {
        session_present: bool,
    },
    Disconnected,
    Subscribed {
        msg_id: i32,
        error: &'a ErrorDetail,
        /// SUBACK payload (granted QoS per filter, 0x80 on failure).
        data: &'a [u8],
    },
    Unsubscribed {
        msg_id: i32,
    },
    Published {
        msg_id: i32,
    },
    Data(MessageFragment<'a>),
    Deleted {
        msg_id: i32,
    },
    Error(&'a ErrorDetail),
    /// Event kind not modelled here, forwarded to the custom callback.
    Other {
        event_id: i32,
        data: &'a [u8],
    },
}

impl ProtocolEvent<'_> {
    /// Numeric event id, matching the engine's event numbering.
    pub fn event_id(&self) -> i32 {
        match self {
            ProtocolEvent::Error(_) => 0,
            ProtocolEvent::Connected { .. } => 1,
            ProtocolEvent::Disconnected => 2,
            ProtocolEvent::Subscribed { .. } => 3,
            ProtocolEvent::Unsubscribed { .. } => 4,
            ProtocolEvent::Published { .. } => 5,
            ProtocolEvent::Data(_) => 6,
            ProtocolEvent::BeforeConnect => 7,
            ProtocolEvent::Deleted { .. } => 8,
            ProtocolEvent::Other { event_id, .. } => *event_id,
        }
    }
}

/// An event tagged with the engine connection that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineEvent<'a> {
    pub client: ClientId,
    pub event: ProtocolEvent<'a>,
}

impl<'a> EngineEvent<'a> {
    pub fn new(client: ClientId, event: ProtocolEvent<'a>) -> Self {
        Self { client, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_return_code_round_trips_known_values() {
        for raw in 0..=5 {
            assert_eq!(ConnectReturnCode::from_raw(raw).raw(), raw);
        }
        assert_eq!(
            ConnectReturnCode::from_raw(5),
            ConnectReturnCode::NotAuthorized
        );
    }

    #[test]
    fn connect_return_code_keeps_out_of_range() {
        assert_eq!(
            ConnectReturnCode::from_raw(42),
            ConnectReturnCode::Unknown(42)
        );
        assert_eq!(ConnectReturnCode::from_raw(-3).raw(), -3);
    }

    #[test]
    fn error_detail_kind() {
        assert_eq!(ErrorDetail::None.kind(), ErrorKind::None);
        assert_eq!(ErrorDetail::transport(104).kind(), ErrorKind::TransportError);
        assert_eq!(
            ErrorDetail::refused(ConnectReturnCode::BadCredentials).kind(),
            ErrorKind::ConnectionRefused
        );
        assert_eq!(
            ErrorDetail::Unknown { raw_kind: 9 }.kind().raw(),
            9
        );
    }

    #[test]
    fn qos_from_level() {
        assert_eq!(QoS::try_from(1), Ok(QoS::AtLeastOnce));
        assert_eq!(QoS::try_from(3), Err(3));
        assert_eq!(QoS::ExactlyOnce.level(), 2);
    }

    #[test]
    fn fragment_is_last() {
        let first = MessageFragment {
            msg_id: 3,
            topic: "t",
            data: b"abcd",
            offset: 0,
            total_len: 6,
            retain: false,
            qos: QoS::AtLeastOnce,
            dup: false,
        };
        assert!(!first.is_last());

        let last = MessageFragment {
            topic: "",
            data: b"ef",
            offset: 4,
            ..first
        };
        assert!(last.is_last());
    }

    #[test]
    fn event_ids() {
        assert_eq!(ProtocolEvent::BeforeConnect.event_id(), 7);
        assert_eq!(ProtocolEvent::Deleted { msg_id: 1 }.event_id(), 8);
        assert_eq!(
            ProtocolEvent::Other {
                event_id: 42,
                data: &[]
            }
            .event_id(),
            42
        );
    }
}
