use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep, Duration};
use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, Origin, ReadTxn, StateVector, Transact, Update};

use crate::client::transport::Transport;
use crate::presentation::ws::protocol::{ClientMessage, ServerMessage};

const MAX_QUEUE_SIZE: usize = 10;
const DEBOUNCE_WAIT: Duration = Duration::from_millis(50);

/// Transaction origin tagged onto every remote update applied locally. The
/// local-update observer checks for this origin and skips re-emitting
/// anything it sees tagged with it -- this is what prevents the echo loop
/// in §4.7 / property 2 of §8.
fn self_origin() -> Origin {
    Origin::from("collabhub-provider-self")
}

/// C7. Bridges a local CRDT replica to the hub: debounces and coalesces
/// local edits, applies remote updates without re-emitting them, and
/// manages resync on reconnect.
pub struct Provider<T: Transport + 'static> {
    document_id: Uuid,
    doc: Doc,
    awareness: Arc<yrs::sync::Awareness>,
    transport: Arc<T>,
    pending: Arc<Mutex<Vec<Vec<u8>>>>,
    flush_notify: Arc<Notify>,
    synced: AtomicBool,
    _update_sub: yrs::Subscription,
}

impl<T: Transport + 'static> Provider<T> {
    /// Builds the provider, wires the local-update observer, and spawns the
    /// debounce/flush loop. The returned handle owns the subscription; drop
    /// it (via `disconnect`) to tear the bridge down.
    pub fn connect(document_id: Uuid, transport: Arc<T>) -> Arc<Self> {
        let doc = Doc::new();
        let awareness = Arc::new(yrs::sync::Awareness::new(doc.clone()));
        let pending: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let flush_notify = Arc::new(Notify::new());

        let pending_for_observer = pending.clone();
        let notify_for_observer = flush_notify.clone();
        let update_sub = doc
            .observe_update_v1(move |txn, event| {
                if txn.origin() == Some(&self_origin()) {
                    return;
                }
                let bytes = event.update.clone();
                let pending = pending_for_observer.clone();
                let notify = notify_for_observer.clone();
                tokio::spawn(async move {
                    pending.lock().await.push(bytes);
                    notify.notify_one();
                });
            })
            .expect("observe_update_v1 should only fail if the doc is already dropped");

        let provider = Arc::new(Self {
            document_id,
            doc,
            awareness,
            transport,
            pending,
            flush_notify,
            synced: AtomicBool::new(false),
            _update_sub: update_sub,
        });

        provider.clone().spawn_flush_loop();
        provider
    }

    fn spawn_flush_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                self.flush_notify.notified().await;
                loop {
                    let queue_len = self.pending.lock().await.len();
                    if queue_len >= MAX_QUEUE_SIZE {
                        break;
                    }
                    tokio::select! {
                        _ = sleep(DEBOUNCE_WAIT) => break,
                        _ = self.flush_notify.notified() => continue,
                    }
                }
                self.flush().await;
            }
        });
    }

    /// Merges everything currently pending into one payload and emits a
    /// single `yjs-update` (§4.7 flush policy).
    async fn flush(&self) {
        let batch: Vec<Vec<u8>> = {
            let mut guard = self.pending.lock().await;
            std::mem::take(&mut *guard)
        };
        if batch.is_empty() {
            return;
        }
        let merged = merge_updates(&batch);
        if let Err(e) = self
            .transport
            .send(ClientMessage::YjsUpdate {
                document_id: self.document_id,
                update: merged,
            })
            .await
        {
            tracing::warn!(document_id = %self.document_id, error = ?e, "provider:flush_send_failed");
        }
    }

    /// Applies a remote CRDT update with the provider's self origin so the
    /// local-update observer ignores the resulting event (no echo).
    pub fn apply_remote_update(&self, update: &[u8]) -> anyhow::Result<()> {
        let parsed = Update::decode_v1(update)?;
        let mut txn = self.doc.transact_mut_with(self_origin());
        txn.apply_update(parsed)?;
        Ok(())
    }

    pub fn apply_awareness_update(&self, update: &[u8]) -> anyhow::Result<()> {
        let parsed = yrs::sync::awareness::AwarenessUpdate::decode_v1(update)?;
        self.awareness.apply_update(parsed)?;
        Ok(())
    }

    /// Encodes the local awareness state as a single update, for the set of
    /// client ids that changed since the last emission (§4.7 awareness path).
    pub fn encode_awareness_update(&self, changed_clients: &[u64]) -> anyhow::Result<Vec<u8>> {
        let update = self.awareness.update_with_clients(changed_clients.iter().copied())?;
        Ok(update.encode_v1())
    }

    /// Handles an incoming server message, applying sync/update/awareness
    /// payloads and marking the provider synced once a `yjs-sync` lands.
    pub async fn handle_server_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::YjsSync { update, .. } => {
                if let Err(e) = self.apply_remote_update(&update) {
                    tracing::warn!(document_id = %self.document_id, error = ?e, "provider:apply_sync_failed");
                }
                self.synced.store(true, Ordering::SeqCst);
            }
            ServerMessage::YjsUpdate { update, .. } => {
                if let Err(e) = self.apply_remote_update(&update) {
                    tracing::warn!(document_id = %self.document_id, error = ?e, "provider:apply_update_failed");
                }
            }
            ServerMessage::YjsAwareness { update, .. } => {
                if let Err(e) = self.apply_awareness_update(&update) {
                    tracing::warn!(document_id = %self.document_id, error = ?e, "provider:apply_awareness_failed");
                }
            }
            ServerMessage::PermissionDenied { message, .. } => {
                tracing::warn!(document_id = %self.document_id, %message, "provider:permission_denied");
            }
            ServerMessage::JoinAck { success, error, .. } => {
                if success {
                    self.synced.store(true, Ordering::SeqCst);
                } else {
                    tracing::warn!(document_id = %self.document_id, ?error, "provider:join_denied");
                }
            }
            ServerMessage::RejoinAck { success, error, .. } => {
                if success {
                    self.synced.store(true, Ordering::SeqCst);
                } else {
                    // §4.7: the server-side rejoin denial (not just a local
                    // send failure) is what must trigger the full fallback.
                    tracing::warn!(document_id = %self.document_id, ?error, "provider:rejoin_denied_falling_back_to_join");
                    if let Err(e) = self
                        .transport
                        .send(ClientMessage::JoinDocument {
                            document_id: self.document_id,
                        })
                        .await
                    {
                        tracing::warn!(document_id = %self.document_id, error = ?e, "provider:fallback_join_failed");
                    }
                }
            }
            ServerMessage::UserJoined { .. } | ServerMessage::UserLeft { .. } => {}
        }
    }

    /// C8 reconnect path: emits `rejoin-document` with the local state
    /// vector. A local send failure falls back to a full `join-document`
    /// immediately; a server-side rejoin denial (`RejoinAck{success:false}`)
    /// is handled asymmetrically in `handle_server_message`, once the ack
    /// actually arrives (§4.7).
    pub async fn reconnect(&self) -> anyhow::Result<()> {
        self.synced.store(false, Ordering::SeqCst);
        let state_vector = {
            let txn = self.doc.transact();
            txn.state_vector().encode_v1()
        };
        let rejoin = self
            .transport
            .send(ClientMessage::RejoinDocument {
                document_id: self.document_id,
                state_vector: Some(state_vector),
            })
            .await;
        if rejoin.is_err() {
            self.transport
                .send(ClientMessage::JoinDocument {
                    document_id: self.document_id,
                })
                .await?;
        }
        Ok(())
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// Flushes any pending local edits best-effort and leaves the document.
    /// Awareness/subscription teardown happens as the provider is dropped.
    pub async fn disconnect(&self) {
        self.flush().await;
        let _ = self
            .transport
            .send(ClientMessage::LeaveDocument {
                document_id: self.document_id,
            })
            .await;
    }
}

fn merge_updates(updates: &[Vec<u8>]) -> Vec<u8> {
    let scratch = Doc::new();
    {
        let mut txn = scratch.transact_mut();
        for bytes in updates {
            if let Ok(update) = Update::decode_v1(bytes) {
                let _ = txn.apply_update(update);
            }
        }
    }
    let txn = scratch.transact();
    txn.encode_state_as_update_v1(&StateVector::default())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use tokio::time::sleep;
    use yrs::{GetString, Text};

    use super::*;

    #[derive(Default)]
    struct FakeTransport {
        sent: StdMutex<Vec<ClientMessage>>,
    }

    impl FakeTransport {
        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn last_update(&self) -> Option<Vec<u8>> {
            self.sent.lock().unwrap().iter().rev().find_map(|m| match m {
                ClientMessage::YjsUpdate { update, .. } => Some(update.clone()),
                _ => None,
            })
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, message: ClientMessage) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&self) -> Option<ServerMessage> {
            None
        }
    }

    /// Scenario S4: several local edits fired in quick succession, all
    /// inside one debounce window, must coalesce into a single `yjs-update`.
    #[tokio::test]
    async fn local_edits_within_the_debounce_window_coalesce_into_one_update() {
        let transport = Arc::new(FakeTransport::default());
        let provider = Provider::connect(Uuid::new_v4(), transport.clone());

        {
            let text = provider.doc.get_or_insert_text("content");
            let mut txn = provider.doc.transact_mut();
            text.push(&mut txn, "hello");
        }
        {
            let text = provider.doc.get_or_insert_text("content");
            let mut txn = provider.doc.transact_mut();
            text.push(&mut txn, " world");
        }

        sleep(Duration::from_millis(200)).await;

        assert_eq!(transport.sent_count(), 1);

        let merged = transport.last_update().expect("one update sent");
        let scratch = Doc::new();
        {
            let parsed = Update::decode_v1(&merged).unwrap();
            scratch.transact_mut().apply_update(parsed).unwrap();
        }
        let text = {
            let txt = scratch.get_or_insert_text("content");
            let txn = scratch.transact();
            txt.get_string(&txn)
        };
        assert_eq!(text, "hello world");
    }

    /// §8 property 2 (No echo): applying a remote update must never be
    /// re-emitted back through the transport as a local edit.
    #[tokio::test]
    async fn remote_updates_are_applied_without_echoing_back_to_the_transport() {
        let transport = Arc::new(FakeTransport::default());
        let provider = Provider::connect(Uuid::new_v4(), transport.clone());

        let remote = Doc::new();
        let remote_text = remote.get_or_insert_text("content");
        remote_text.push(&mut remote.transact_mut(), "from peer");
        let update = {
            let txn = remote.transact();
            txn.encode_state_as_update_v1(&StateVector::default())
        };

        provider.apply_remote_update(&update).unwrap();

        sleep(Duration::from_millis(200)).await;

        assert_eq!(transport.sent_count(), 0);

        let text = {
            let txt = provider.doc.get_or_insert_text("content");
            let txn = provider.doc.transact();
            txt.get_string(&txn)
        };
        assert_eq!(text, "from peer");
    }
}
