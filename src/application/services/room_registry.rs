use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::presence::Subscriber;

/// C5. Tracks which sessions are subscribed to which document room, plus
/// the identity tuple of each subscriber. Drives join/leave broadcasts; the
/// dispatcher owns the actual broadcast fan-out, this registry only owns
/// the membership bookkeeping (§3 "Room", §4.5).
pub struct RoomRegistry {
    rooms: RwLock<HashMap<Uuid, HashMap<Uuid, Subscriber>>>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts `session_id` into `document_id`'s room and returns the
    /// current subscriber list, including the new entry -- the joiner's ack
    /// carries this inline rather than via broadcast (§4.5).
    pub async fn join(
        &self,
        document_id: Uuid,
        session_id: Uuid,
        subscriber: Subscriber,
    ) -> Vec<Subscriber> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(document_id).or_default();
        room.insert(session_id, subscriber);
        room.values().cloned().collect()
    }

    /// Removes `session_id` from `document_id`'s room. Returns `true` if the
    /// room is now empty, which the caller uses as a signal to consider
    /// replica retirement (§4.3).
    pub async fn leave(&self, document_id: Uuid, session_id: Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&document_id) else {
            return true;
        };
        room.remove(&session_id);
        let empty = room.is_empty();
        if empty {
            rooms.remove(&document_id);
        }
        empty
    }

    /// Removes `session_id` from every room it had joined. Used on socket
    /// disconnect. Returns the set of rooms that became empty as a result.
    pub async fn leave_all(&self, session_id: Uuid) -> Vec<Uuid> {
        let mut rooms = self.rooms.write().await;
        let mut emptied = Vec::new();
        rooms.retain(|document_id, room| {
            if room.remove(&session_id).is_some() && room.is_empty() {
                emptied.push(*document_id);
                false
            } else {
                true
            }
        });
        emptied
    }

    pub async fn is_empty(&self, document_id: Uuid) -> bool {
        self.rooms
            .read()
            .await
            .get(&document_id)
            .map(|r| r.is_empty())
            .unwrap_or(true)
    }

    /// Fan-out target list for broadcasts: every session in the room except
    /// the originator.
    pub async fn peers(&self, document_id: Uuid, except_session_id: Uuid) -> Vec<Uuid> {
        self.rooms
            .read()
            .await
            .get(&document_id)
            .map(|r| r.keys().filter(|id| **id != except_session_id).copied().collect())
            .unwrap_or_default()
    }

}

pub type SharedRoomRegistry = Arc<RoomRegistry>;
