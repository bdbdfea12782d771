use async_trait::async_trait;

use crate::presentation::ws::protocol::{ClientMessage, ServerMessage};

/// The provider's view of the socket: send an envelope, receive the next
/// one. A real implementation wraps a WebSocket client; tests substitute an
/// in-memory channel pair so the debounce/resync logic can be exercised
/// without a network (§4.7, §4.8).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: ClientMessage) -> anyhow::Result<()>;
    async fn recv(&self) -> Option<ServerMessage>;
}
