use std::collections::HashSet;

use uuid::Uuid;

use crate::application::access::{self, AccessError};
use crate::application::services::reconnect_sync;
use crate::bootstrap::app_context::AppContext;
use crate::domain::identity::Identity;
use crate::domain::presence::Subscriber;
use crate::presentation::ws::protocol::{ClientMessage, PresenceUser, ServerMessage};

/// C6. One instance per connected session. Routes each `ClientMessage` in
/// arrival order (§5 "per-session dispatch"); holds no lock across an
/// await, so one session's I/O never blocks another's.
pub struct Dispatcher {
    ctx: AppContext,
    session_id: Uuid,
    identity: Identity,
    joined: HashSet<Uuid>,
}

impl Dispatcher {
    pub fn new(ctx: AppContext, session_id: Uuid, identity: Identity) -> Self {
        Self {
            ctx,
            session_id,
            identity,
            joined: HashSet::new(),
        }
    }

    pub async fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinDocument { document_id } => self.handle_join(document_id).await,
            ClientMessage::RejoinDocument {
                document_id,
                state_vector,
            } => self.handle_rejoin(document_id, state_vector).await,
            ClientMessage::LeaveDocument { document_id } => self.handle_leave(document_id).await,
            ClientMessage::YjsUpdate {
                document_id,
                update,
            } => self.handle_update(document_id, update).await,
            ClientMessage::YjsAwareness {
                document_id,
                update,
            } => self.handle_awareness(document_id, update).await,
        }
    }

    async fn handle_join(&mut self, document_id: Uuid) {
        let role = match access::resolve_role(self.ctx.documents.as_ref(), document_id, self.identity.id).await {
            Ok(role) => role,
            Err(AccessError::NotFound) => {
                self.ack_error(document_id, true, "document not found or access denied").await;
                return;
            }
            Err(AccessError::Forbidden) => {
                self.ack_error(document_id, true, "forbidden").await;
                return;
            }
        };

        let full_state = match self.ctx.replicas.encode_full_state(document_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(%document_id, error = ?e, "dispatcher:join_hydrate_failed");
                self.ack_error(document_id, true, "failed to load document").await;
                return;
            }
        };

        self.ctx
            .sessions
            .send_to(
                self.session_id,
                &ServerMessage::YjsSync {
                    document_id,
                    update: full_state,
                },
            )
            .await;

        self.join_room_and_ack(document_id, role, true).await;
    }

    async fn handle_rejoin(&mut self, document_id: Uuid, state_vector: Option<Vec<u8>>) {
        let role = match access::resolve_role(self.ctx.documents.as_ref(), document_id, self.identity.id).await {
            Ok(role) => role,
            Err(_) => {
                self.ack_error(document_id, false, "document not found or access denied").await;
                return;
            }
        };

        let diff = match reconnect_sync::diff_for_rejoin(
            &self.ctx.replicas,
            document_id,
            state_vector.as_deref(),
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(%document_id, error = ?e, "dispatcher:rejoin_diff_failed");
                self.ack_error(document_id, false, "failed to resync document").await;
                return;
            }
        };

        self.ctx
            .sessions
            .send_to(
                self.session_id,
                &ServerMessage::YjsSync {
                    document_id,
                    update: diff,
                },
            )
            .await;

        self.join_room_and_ack(document_id, role, false).await;
    }

    async fn join_room_and_ack(&mut self, document_id: Uuid, role: crate::domain::document::Role, is_fresh_join: bool) {
        let subscriber = Subscriber {
            user_id: self.identity.id,
            display_name: self.identity.email.clone(),
            email: self.identity.email.clone(),
            role,
        };
        let peers_before = self.ctx.rooms.peers(document_id, self.session_id).await;
        let users = self
            .ctx
            .rooms
            .join(document_id, self.session_id, subscriber)
            .await;
        self.joined.insert(document_id);

        let users_wire: Vec<PresenceUser> = users
            .iter()
            .map(|s| PresenceUser {
                user_id: s.user_id,
                display_name: s.display_name.clone(),
                email: s.email.clone(),
                role: s.role.into(),
            })
            .collect();

        let ack = if is_fresh_join {
            ServerMessage::JoinAck {
                document_id,
                success: true,
                users: users_wire,
                error: None,
            }
        } else {
            ServerMessage::RejoinAck {
                document_id,
                success: true,
                users: users_wire,
                error: None,
            }
        };
        self.ctx.sessions.send_to(self.session_id, &ack).await;

        // Joiner gets its peer list inline above, not via broadcast (§4.5);
        // existing peers separately learn of the new joiner here.
        self.ctx
            .sessions
            .send_to_many(
                &peers_before,
                &ServerMessage::UserJoined {
                    document_id,
                    user_id: self.identity.id,
                    display_name: self.identity.email.clone(),
                    email: self.identity.email.clone(),
                },
            )
            .await;
    }

    async fn ack_error(&self, document_id: Uuid, is_fresh_join: bool, message: &str) {
        let ack = if is_fresh_join {
            ServerMessage::JoinAck {
                document_id,
                success: false,
                users: vec![],
                error: Some(message.to_string()),
            }
        } else {
            ServerMessage::RejoinAck {
                document_id,
                success: false,
                users: vec![],
                error: Some(message.to_string()),
            }
        };
        self.ctx.sessions.send_to(self.session_id, &ack).await;
    }

    async fn handle_leave(&mut self, document_id: Uuid) {
        let peers = self.ctx.rooms.peers(document_id, self.session_id).await;
        let room_empty = self.ctx.rooms.leave(document_id, self.session_id).await;
        self.joined.remove(&document_id);

        self.ctx
            .sessions
            .send_to_many(
                &peers,
                &ServerMessage::UserLeft {
                    document_id,
                    user_id: self.identity.id,
                },
            )
            .await;

        if room_empty {
            if let Err(e) = self.ctx.replicas.retire(document_id, true).await {
                tracing::error!(%document_id, error = ?e, "dispatcher:retire_failed");
            }
        }
    }

    async fn handle_update(&mut self, document_id: Uuid, update: Vec<u8>) {
        let role = match access::resolve_role(self.ctx.documents.as_ref(), document_id, self.identity.id).await {
            Ok(role) => role,
            Err(_) => {
                self.deny(document_id, "document not found or access denied").await;
                return;
            }
        };
        if access::require_update(role).is_err() {
            self.deny(document_id, "viewers cannot edit this document").await;
            return;
        }

        let should_save = match self.ctx.replicas.apply_update(document_id, &update).await {
            Ok(flag) => flag,
            Err(e) => {
                // Malformed update bytes: logged and dropped, connection kept (§7).
                tracing::warn!(%document_id, error = ?e, "dispatcher:malformed_update_dropped");
                return;
            }
        };

        let peers = self.ctx.rooms.peers(document_id, self.session_id).await;
        self.ctx
            .sessions
            .send_to_many(
                &peers,
                &ServerMessage::YjsUpdate {
                    document_id,
                    update,
                    user_id: self.identity.id,
                },
            )
            .await;

        if should_save.0 {
            // Offloaded per §4.6 -- a DB round-trip here would block this
            // session's own message loop on every other session's updates.
            let replicas = self.ctx.replicas.clone();
            tokio::spawn(async move {
                if let Err(e) = replicas.save_now(document_id).await {
                    tracing::error!(%document_id, error = ?e, "dispatcher:threshold_save_failed");
                }
            });
        }
    }

    async fn handle_awareness(&mut self, document_id: Uuid, update: Vec<u8>) {
        let peers = self.ctx.rooms.peers(document_id, self.session_id).await;
        self.ctx
            .sessions
            .send_to_many(
                &peers,
                &ServerMessage::YjsAwareness {
                    document_id,
                    update,
                    user_id: self.identity.id,
                },
            )
            .await;
    }

    async fn deny(&self, document_id: Uuid, message: &str) {
        self.ctx
            .sessions
            .send_to(
                self.session_id,
                &ServerMessage::PermissionDenied {
                    document_id,
                    message: message.to_string(),
                },
            )
            .await;
    }

    /// Called when the socket closes. Leaves every room the session had
    /// joined, broadcasting `user-left` to each, and retires any replica
    /// whose room this departure emptied.
    pub async fn on_disconnect(self) {
        let mut peers_by_document = Vec::with_capacity(self.joined.len());
        for document_id in &self.joined {
            let peers = self.ctx.rooms.peers(*document_id, self.session_id).await;
            peers_by_document.push((*document_id, peers));
        }
        let emptied = self.ctx.rooms.leave_all(self.session_id).await;

        for (document_id, peers) in peers_by_document {
            self.ctx
                .sessions
                .send_to_many(
                    &peers,
                    &ServerMessage::UserLeft {
                        document_id,
                        user_id: self.identity.id,
                    },
                )
                .await;
        }
        for document_id in emptied {
            if let Err(e) = self.ctx.replicas.retire(document_id, true).await {
                tracing::error!(%document_id, error = ?e, "dispatcher:retire_on_disconnect_failed");
            }
        }
        self.ctx.sessions.unregister(self.session_id).await;
    }
}
