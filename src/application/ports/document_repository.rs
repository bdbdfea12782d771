use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::document::Document;

/// The external metadata store's document-facing surface (§6). Collaborator
/// management and document CRUD endpoints are out of scope; this port is
/// narrowed to exactly what the hub needs: resolve access, load the record
/// for hydration, and persist the snapshot blob.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Returns the document iff `user_id` is the owner or a listed
    /// collaborator. A `None` here is indistinguishable to the caller from
    /// "no such document" (§4.2 -- avoids enumeration).
    async fn find_for_access(
        &self,
        document_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<Document>>;

    /// Loads the full record, used once a role has already been
    /// established, to read `snapshot_blob` during replica hydration.
    async fn load(&self, document_id: Uuid) -> anyhow::Result<Option<Document>>;

    /// Overwrites `snapshotBlob` with the replica's current full-state
    /// encoding (§4.4). Idempotent: the previous blob is simply replaced.
    async fn persist_snapshot(&self, document_id: Uuid, blob: &[u8]) -> anyhow::Result<()>;
}
