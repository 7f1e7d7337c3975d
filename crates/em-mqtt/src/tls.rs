//! TLS transport selection for broker connections.
//!
//! Certificates arrive as PEM blobs on the connection config (set with the
//! client's cert setters or loaded from files by `MqttSettings`) and are
//! handed to rumqttc's rustls transport.

use rumqttc::{TlsConfiguration, Transport};

use crate::config::ConnectionConfig;
use crate::error::{EngineError, EngineResult};

/// Whether a URI scheme asks for TLS. `None` for unsupported schemes.
pub fn scheme_uses_tls(scheme: &str) -> Option<bool> {
    match scheme {
        "mqtt" | "tcp" => Some(false),
        "mqtts" | "ssl" => Some(true),
        _ => None,
    }
}

/// Build a TLS transport from the PEM blobs in the config.
///
/// The CA certificate is mandatory. Client certificate and key enable
/// mutual TLS and must be given together.
pub fn tls_transport(config: &ConnectionConfig) -> EngineResult<Transport> {
    let ca = config
        .ca_cert
        .clone()
        .ok_or_else(|| EngineError::Init("TLS broker requires a CA certificate".into()))?;

    let client_auth = match (&config.client_cert, &config.client_key) {
        (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
        (None, None) => None,
        (Some(_), None) => {
            return Err(EngineError::Init(
                "client certificate set without a private key".into(),
            ));
        }
        (None, Some(_)) => {
            return Err(EngineError::Init(
                "private key set without a client certificate".into(),
            ));
        }
    };

    tracing::debug!(mutual = client_auth.is_some(), "using TLS transport");
    Ok(Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    }))
}

/// Pick the transport for `scheme`.
pub fn transport_for(scheme: &str, config: &ConnectionConfig) -> EngineResult<Transport> {
    match scheme_uses_tls(scheme) {
        Some(true) => tls_transport(config),
        Some(false) => Ok(Transport::Tcp),
        None => Err(EngineError::Init(format!(
            "unsupported broker scheme '{scheme}'"
        ))),
    }
}
