//! A single open push channel (spec §4.8): never carries row data, only
//! nudges. Transport-agnostic — `sync-notify` never depends on axum or
//! websockets directly; those live in the excluded front-end route layer.

use sync_wire::RealtimeEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque handle distinguishing one open connection from another, even when
/// the same client has several (multiple tabs/devices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
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

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One outbound push channel. The registry holds `Arc<dyn Connection>`;
/// implementations only need to get a `RealtimeEvent` to the far end and
/// report whether the channel is still alive.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;
    fn client_id(&self) -> &str;
    /// Best-effort send. Implementations never block; a full or closed
    /// channel is reported via `Err` rather than discovered only on the
    /// next heartbeat.
    fn send(&self, event: RealtimeEvent) -> Result<(), SendError>;
    fn is_closed(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection is closed")]
    Closed,
}

/// `tokio::sync::mpsc`-backed connection — the shape a thin front-end
/// adapter (WebSocket/SSE handler, out of scope here) wraps around its own
/// socket write half.
pub struct MpscConnection {
    id: ConnectionId,
    client_id: String,
    sender: mpsc::UnboundedSender<RealtimeEvent>,
}

impl MpscConnection {
    /// Returns the connection plus the receiving half a transport adapter
    /// drains to forward frames over the wire.
    pub fn new(client_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::new(),
                client_id: client_id.into(),
                sender,
            },
            receiver,
        )
    }
}

impl Connection for MpscConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn send(&self, event: RealtimeEvent) -> Result<(), SendError> {
        self.sender.send(event).map_err(|_| SendError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_after_receiver_drop_reports_closed() {
        let (conn, receiver) = MpscConnection::new("client-1");
        drop(receiver);
        assert!(conn.send(RealtimeEvent::Heartbeat).is_err());
        assert!(conn.is_closed());
    }
}
