use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message as AxumMessage;
use tokio::sync::{mpsc, Notify, RwLock};
use uuid::Uuid;

use crate::presentation::ws::protocol::ServerMessage;

struct Session {
    outbound: mpsc::Sender<AxumMessage>,
    kill: Arc<Notify>,
}

/// Per-session bounded outbound mailbox. The dispatcher's broadcast fan-out
/// writes here; the socket write task drains it. A full mailbox means the
/// peer is too slow to keep up -- per §5's backpressure rule the session is
/// dropped rather than allowed to block the room, and the client will
/// reconnect and resync via state-vector diff (§4.8).
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session's outbound mailbox. Returns the receiving
    /// end for the socket's writer task plus a kill notifier the entry
    /// point must select on alongside its reader loop, so a registry-forced
    /// close actually tears the whole connection down (§5).
    pub async fn register(&self, session_id: Uuid, capacity: usize) -> (mpsc::Receiver<AxumMessage>, Arc<Notify>) {
        let (tx, rx) = mpsc::channel(capacity);
        let kill = Arc::new(Notify::new());
        self.inner.write().await.insert(
            session_id,
            Session {
                outbound: tx,
                kill: kill.clone(),
            },
        );
        (rx, kill)
    }

    pub async fn unregister(&self, session_id: Uuid) {
        self.inner.write().await.remove(&session_id);
    }

    /// Sends to one session. On a full or closed mailbox the session is
    /// force-closed instead of awaiting -- never blocks the caller.
    pub async fn send_to(&self, session_id: Uuid, message: &ServerMessage) {
        let sender = self
            .inner
            .read()
            .await
            .get(&session_id)
            .map(|s| s.outbound.clone());
        let Some(sender) = sender else { return };
        let Ok(json) = serde_json::to_vec(message) else {
            return;
        };
        if sender
            .try_send(AxumMessage::Text(String::from_utf8_lossy(&json).into_owned()))
            .is_err()
        {
            tracing::warn!(%session_id, "session:outbound_saturated_dropping");
            self.force_close(session_id).await;
        }
    }

    /// Deregisters the session and wakes its entry point's kill switch,
    /// so the reader loop breaks, the socket closes, and `on_disconnect`
    /// runs -- the room and replica retirement this depends on otherwise
    /// never see the departure.
    async fn force_close(&self, session_id: Uuid) {
        if let Some(session) = self.inner.write().await.remove(&session_id) {
            session.kill.notify_one();
        }
    }

    pub async fn send_to_many(&self, session_ids: &[Uuid], message: &ServerMessage) {
        for id in session_ids {
            self.send_to(*id, message).await;
        }
    }
}
