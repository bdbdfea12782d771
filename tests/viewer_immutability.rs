mod common;

use std::sync::Arc;

use collabhub::application::access::{self, AccessError};
use collabhub::application::services::replica_registry::{ReplicaRegistry, ReplicaRegistryTunables};
use collabhub::application::services::snapshot_service::SnapshotService;
use collabhub::domain::document::{Collaborator, Role};
use common::{blank_document, InMemoryDocumentRepository};
use pretty_assertions::assert_eq;
use uuid::Uuid;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, Transact};

/// §8 property 3 (Viewer immutability) / scenario S2: a viewer's update is
/// rejected by the access check before it ever reaches the replica.
#[tokio::test]
async fn viewer_update_is_rejected_and_replica_is_unchanged() {
    let documents = InMemoryDocumentRepository::shared();
    let document_id = Uuid::new_v4();
    let owner = Uuid::new_v4();
    let viewer = Uuid::new_v4();
    let mut doc = blank_document(document_id, owner);
    doc.collaborators.push(Collaborator {
        user_id: viewer,
        role: Role::Viewer,
    });
    documents.insert(doc).await;

    let snapshots = Arc::new(SnapshotService::new(documents.clone()));
    let registry = ReplicaRegistry::new(snapshots, ReplicaRegistryTunables::default());

    let seed = Doc::new();
    let seed_text = seed.get_or_insert_text("content");
    seed_text.push(&mut seed.transact_mut(), "hello");
    let seed_update = {
        let txn = seed.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    };
    registry.apply_update(document_id, &seed_update).await.unwrap();

    let role = access::resolve_role(documents.as_ref(), document_id, viewer)
        .await
        .unwrap();
    assert_eq!(role, Role::Viewer);
    assert!(matches!(
        access::require_update(role),
        Err(AccessError::Forbidden)
    ));

    // The dispatcher would stop here on a Forbidden verdict; confirm the
    // replica the viewer never got to mutate still reads "hello" only.
    let replica = registry.acquire(document_id).await.unwrap();
    let text = {
        let txt = replica.doc.get_or_insert_text("content");
        let txn = replica.doc.transact();
        txt.get_string(&txn)
    };
    assert_eq!(text, "hello");
}
