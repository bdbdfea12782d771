use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use crate::application::services::snapshot_service::SnapshotService;

/// Tunables from §4.3/§4.4, overridable via `Config`.
#[derive(Debug, Clone, Copy)]
pub struct ReplicaRegistryTunables {
    pub save_interval: Duration,
    pub update_threshold: u32,
    pub inactive_timeout: Duration,
    pub cleanup_check_interval: Duration,
}

impl Default for ReplicaRegistryTunables {
    fn default() -> Self {
        Self {
            save_interval: Duration::from_secs(30),
            update_threshold: 50,
            inactive_timeout: Duration::from_secs(5 * 60),
            cleanup_check_interval: Duration::from_secs(60),
        }
    }
}

/// The authoritative in-memory CRDT replica for one document, plus the
/// bookkeeping the registry needs to decide when to save and when to retire
/// it (§3 "Authoritative replica"). Every live replica owns a running
/// periodic snapshot timer (§3/§4.3) for as long as it stays in the
/// registry's map; `ReplicaRegistry::retire` cancels it before the replica
/// is dropped.
pub struct Replica {
    pub doc: Doc,
    pub update_count: Mutex<u32>,
    pub last_access: Mutex<Instant>,
    save_timer: JoinHandle<()>,
}

impl Replica {
    /// Builds the replica and spawns its `SaveInterval` timer. The timer
    /// task only holds a `Weak` handle back to the replica, so it exits on
    /// its own once the strong count drops to zero even if `retire` never
    /// gets to abort it explicitly.
    fn spawn(doc: Doc, document_id: Uuid, snapshots: Arc<SnapshotService>, save_interval: Duration) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Replica>| {
            let weak = weak.clone();
            let save_timer = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(save_interval);
                ticker.tick().await; // first tick fires immediately; nothing to save yet
                loop {
                    ticker.tick().await;
                    let Some(replica) = weak.upgrade() else { break };
                    if let Err(e) = snapshots.save(document_id, &replica.doc).await {
                        tracing::error!(%document_id, error = ?e, "replica:periodic_save_failed");
                    }
                }
            });
            Self {
                doc,
                update_count: Mutex::new(0),
                last_access: Mutex::new(Instant::now()),
                save_timer,
            }
        })
    }

    pub async fn touch(&self) {
        *self.last_access.lock().await = Instant::now();
    }

    pub async fn idle_for(&self) -> Duration {
        self.last_access.lock().await.elapsed()
    }
}

type Slot = Arc<OnceCell<Arc<Replica>>>;

/// C3. Owns the set of live authoritative replicas keyed by document id.
/// Lazy-creates on first `acquire`, single-flights concurrent creation for
/// the same id via a per-key `OnceCell`, and retires replicas whose room
/// has emptied and gone quiet (§4.3).
pub struct ReplicaRegistry {
    slots: RwLock<HashMap<Uuid, Slot>>,
    snapshots: Arc<SnapshotService>,
    tunables: ReplicaRegistryTunables,
}

impl ReplicaRegistry {
    pub fn new(snapshots: Arc<SnapshotService>, tunables: ReplicaRegistryTunables) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            snapshots,
            tunables,
        }
    }

    /// Returns the live replica for `document_id`, hydrating it from the
    /// persisted snapshot if this is the first activation.
    pub async fn acquire(&self, document_id: Uuid) -> anyhow::Result<Arc<Replica>> {
        let cell = {
            let mut slots = self.slots.write().await;
            slots
                .entry(document_id)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let replica = cell
            .get_or_try_init(|| async {
                tracing::debug!(%document_id, "replica:hydrate");
                let doc = Doc::new();
                if let Some(blob) = self.snapshots.load(document_id).await? {
                    if let Ok(update) = Update::decode_v1(&blob) {
                        let mut txn = doc.transact_mut();
                        if let Err(e) = txn.apply_update(update) {
                            tracing::warn!(%document_id, error = ?e, "replica:hydrate_apply_failed");
                        }
                    }
                }
                Ok::<_, anyhow::Error>(Replica::spawn(
                    doc,
                    document_id,
                    self.snapshots.clone(),
                    self.tunables.save_interval,
                ))
            })
            .await?
            .clone();
        replica.touch().await;
        Ok(replica)
    }

    /// Applies `update` under the document's lock, bumps `update_count`, and
    /// reports whether the save threshold (§4.4) was crossed.
    pub async fn apply_update(
        &self,
        document_id: Uuid,
        update: &[u8],
    ) -> anyhow::Result<ShouldSave> {
        let replica = self.acquire(document_id).await?;
        let parsed = Update::decode_v1(update)?;
        {
            let mut txn = replica.doc.transact_mut();
            txn.apply_update(parsed)?;
        }
        replica.touch().await;
        let mut count = replica.update_count.lock().await;
        *count += 1;
        let crossed = *count >= self.tunables.update_threshold;
        if crossed {
            *count = 0;
        }
        Ok(ShouldSave(crossed))
    }

    pub async fn encode_full_state(&self, document_id: Uuid) -> anyhow::Result<Vec<u8>> {
        let replica = self.acquire(document_id).await?;
        let txn = replica.doc.transact();
        Ok(txn.encode_state_as_update_v1(&StateVector::default()))
    }

    pub async fn encode_diff(
        &self,
        document_id: Uuid,
        client_state_vector: Option<&[u8]>,
    ) -> anyhow::Result<Vec<u8>> {
        let replica = self.acquire(document_id).await?;
        let sv = client_state_vector
            .and_then(|bytes| StateVector::decode_v1(bytes).ok())
            .unwrap_or_default();
        let txn = replica.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Saves and, if the room is confirmed empty by the caller, drops the
    /// in-memory replica. `room_empty` is supplied by the dispatcher, which
    /// owns presence and knows the current room occupancy precisely.
    pub async fn retire(&self, document_id: Uuid, room_empty: bool) -> anyhow::Result<()> {
        let replica = {
            let slots = self.slots.read().await;
            match slots.get(&document_id) {
                Some(cell) => cell.get().cloned(),
                None => None,
            }
        };
        let Some(replica) = replica else {
            return Ok(());
        };
        self.snapshots.save(document_id, &replica.doc).await?;
        if room_empty {
            self.slots.write().await.remove(&document_id);
            replica.save_timer.abort();
            tracing::debug!(%document_id, "replica:retired");
        }
        Ok(())
    }

    /// Persists without removing the in-memory replica -- the
    /// `update_threshold` trigger (§4.4) uses this, since the room is
    /// necessarily non-empty (the update just came from a member of it).
    pub async fn save_now(&self, document_id: Uuid) -> anyhow::Result<()> {
        self.retire(document_id, false).await
    }

    /// Saves every live replica without retiring it. Used on graceful
    /// shutdown (§10.6) so in-flight edits are not lost to an unclean exit.
    pub async fn save_all(&self) -> anyhow::Result<()> {
        let ids: Vec<Uuid> = {
            let slots = self.slots.read().await;
            slots.keys().copied().collect()
        };
        for document_id in ids {
            self.save_now(document_id).await?;
        }
        Ok(())
    }

    /// The background reaper (§4.3): retires any replica idle longer than
    /// `inactive_timeout` whose room the caller reports as empty. `room_empty`
    /// is a callback so the registry never has to know about presence
    /// directly.
    pub async fn reap_idle<F, Fut>(&self, room_empty: F) -> anyhow::Result<()>
    where
        F: Fn(Uuid) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let candidates: Vec<Uuid> = {
            let slots = self.slots.read().await;
            slots.keys().copied().collect()
        };
        for document_id in candidates {
            let replica = {
                let slots = self.slots.read().await;
                slots.get(&document_id).and_then(|c| c.get().cloned())
            };
            let Some(replica) = replica else { continue };
            if replica.idle_for().await < self.tunables.inactive_timeout {
                continue;
            }
            if room_empty(document_id).await {
                self.retire(document_id, true).await?;
            }
        }
        Ok(())
    }

    pub fn tunables(&self) -> ReplicaRegistryTunables {
        self.tunables
    }
}

/// Signals to the dispatcher whether the just-applied update crossed the
/// save threshold and a snapshot should be triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShouldSave(pub bool);
