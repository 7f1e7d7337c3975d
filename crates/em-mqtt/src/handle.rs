//! Owned engine connection, released when dropped.

use std::fmt;

use crate::engine::{ClientId, EngineClient};

/// Exclusive owner of one engine connection.
///
/// Not `Clone`: there is exactly one owner, and dropping it destroys the
/// engine-side connection on every exit path.
pub struct ConnectionHandle {
    client: Box<dyn EngineClient>,
}

impl ConnectionHandle {
    pub(crate) fn new(client: Box<dyn EngineClient>) -> Self {
        Self { client }
    }

    pub fn id(&self) -> ClientId {
        self.client.id()
    }

    pub(crate) fn engine(&self) -> &dyn EngineClient {
        self.client.as_ref()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        tracing::debug!(client = %self.client.id(), "destroying MQTT client handle");
        self.client.destroy();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.client.id())
            .finish()
    }
}
