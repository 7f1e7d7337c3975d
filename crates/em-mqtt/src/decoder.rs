//! Diagnostic rendering of error details delivered with Error events.
//!
//! Decoding is for logs only: the detail handed to the application's
//! error callback is never altered.

use std::fmt;
use std::io;

use crate::event::{ConnectReturnCode, ErrorDetail};

/// Structured, printable description of an [`ErrorDetail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDescription {
    NoError,
    Transport {
        tls_last_error: i32,
        tls_stack_error: i32,
        tls_stack_message: String,
        sock_errno: i32,
        sock_message: String,
    },
    ConnectionRefused {
        code: i32,
        reason: &'static str,
    },
    UnknownType {
        raw_kind: i32,
    },
}

impl fmt::Display for ErrorDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDescription::NoError => write!(f, "no error"),
            ErrorDescription::Transport {
                tls_last_error,
                tls_stack_error,
                tls_stack_message,
                sock_errno,
                sock_message,
            } => write!(
                f,
                "transport error: tls last error 0x{tls_last_error:x}, \
                 tls stack error 0x{tls_stack_error:x} ({tls_stack_message}), \
                 socket errno {sock_errno} ({sock_message})"
            ),
            ErrorDescription::ConnectionRefused { code, reason } => {
                write!(f, "connection refused: {reason} (0x{code:x})")
            }
            ErrorDescription::UnknownType { raw_kind } => {
                write!(f, "unknown error type (0x{raw_kind:x})")
            }
        }
    }
}

/// Decode an error detail. Pure; tolerates any raw value.
pub fn describe(detail: &ErrorDetail) -> ErrorDescription {
    match *detail {
        ErrorDetail::None => ErrorDescription::NoError,
        ErrorDetail::TransportError {
            tls_last_error,
            tls_stack_error,
            sock_errno,
        } => ErrorDescription::Transport {
            tls_last_error,
            tls_stack_error,
            tls_stack_message: errno_message(tls_stack_error),
            sock_errno,
            sock_message: errno_message(sock_errno),
        },
        ErrorDetail::ConnectionRefused { code } => ErrorDescription::ConnectionRefused {
            code: code.raw(),
            reason: connect_reason(code),
        },
        ErrorDetail::Unknown { raw_kind } => ErrorDescription::UnknownType { raw_kind },
    }
}

/// Human-readable reason for a CONNACK return code.
pub fn connect_reason(code: ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::Accepted => "connection accepted",
        ConnectReturnCode::ProtocolRefused => "unacceptable protocol version",
        ConnectReturnCode::IdRejected => "client identifier rejected",
        ConnectReturnCode::ServerUnavailable => "server unavailable",
        ConnectReturnCode::BadCredentials => "bad username or password",
        ConnectReturnCode::NotAuthorized => "not authorized",
        ConnectReturnCode::Unknown(_) => "unknown connect return code",
    }
}

/// OS string for an errno value; `0` means success.
fn errno_message(errno: i32) -> String {
    if errno == 0 {
        return "success".to_string();
    }
    io::Error::from_raw_os_error(errno).to_string()
}

/// Log the decoded form of `detail` at debug level.
pub fn log_error(detail: &ErrorDetail) {
    let description = describe(detail);
    tracing::debug!(kind = detail.kind().raw(), error = %description, "MQTT error detail");
}
