use std::fmt;

use logreplay_protocol::ReplayResult;
use tracing::info;
use uuid::Uuid;

/// Identity of one observer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State private to one connection, owned by whatever drives that
/// connection. There is deliberately no process-wide table of these.
#[derive(Debug)]
pub struct SessionState {
    connection_id: ConnectionId,
    last_result: Option<ReplayResult>,
}

impl SessionState {
    pub fn on_connect(connection_id: ConnectionId) -> Self {
        info!(%connection_id, "session opened");
        Self {
            connection_id,
            last_result: None,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Replaces any earlier result.
    pub fn on_replay_complete(&mut self, result: ReplayResult) {
        info!(
            connection_id = %self.connection_id,
            alerts = result.alerts.len(),
            "stored replay result"
        );
        self.last_result = Some(result);
    }

    pub fn last_result(&self) -> Option<&ReplayResult> {
        self.last_result.as_ref()
    }

    pub fn on_disconnect(self) {
        info!(
            connection_id = %self.connection_id,
            had_result = self.last_result.is_some(),
            "session closed"
        );
    }
}
