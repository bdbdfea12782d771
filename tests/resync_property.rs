mod common;

use std::sync::Arc;

use collabhub::application::services::replica_registry::{ReplicaRegistry, ReplicaRegistryTunables};
use collabhub::application::services::snapshot_service::SnapshotService;
use common::{blank_document, InMemoryDocumentRepository};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, Transact, Update};

/// §8 property 4 (Resync idempotence): for a client that has observed a
/// prefix of the edits applied to the server, `encode_diff(server, V)`
/// applied to a replica at V must yield exactly the server's state.
fn run_resync_case(chunks: Vec<String>, client_sees: usize) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let documents = InMemoryDocumentRepository::shared();
        let document_id = Uuid::new_v4();
        documents
            .insert(blank_document(document_id, Uuid::new_v4()))
            .await;
        let snapshots = Arc::new(SnapshotService::new(documents.clone()));
        let registry = ReplicaRegistry::new(snapshots, ReplicaRegistryTunables::default());

        let client = Doc::new();
        let client_text = client.get_or_insert_text("content");

        let split = client_sees.min(chunks.len());
        for chunk in &chunks[..split] {
            client_text.push(&mut client.transact_mut(), chunk);
            let update = {
                let txn = client.transact();
                txn.encode_state_as_update_v1(&StateVector::default())
            };
            registry.apply_update(document_id, &update).await.unwrap();
        }
        let client_sv = {
            let txn = client.transact();
            yrs::updates::encoder::Encode::encode_v1(&txn.state_vector())
        };

        for chunk in &chunks[split..] {
            let author = Doc::new();
            let author_text = author.get_or_insert_text("content");
            author_text.push(&mut author.transact_mut(), chunk);
            let update = {
                let txn = author.transact();
                txn.encode_state_as_update_v1(&StateVector::default())
            };
            registry.apply_update(document_id, &update).await.unwrap();
        }

        let diff = registry
            .encode_diff(document_id, Some(&client_sv))
            .await
            .unwrap();
        if let Ok(parsed) = Update::decode_v1(&diff) {
            let mut txn = client.transact_mut();
            txn.apply_update(parsed).unwrap();
        }

        let replica = registry.acquire(document_id).await.unwrap();
        let server_text = {
            let txt = replica.doc.get_or_insert_text("content");
            let txn = replica.doc.transact();
            txt.get_string(&txn)
        };
        let client_text_after = {
            let txn = client.transact();
            client_text.get_string(&txn)
        };
        assert_eq!(server_text, client_text_after);
    });
}

proptest! {
    #[test]
    fn resync_reaches_server_state(
        chunks in prop::collection::vec("[a-z]{1,6}", 1..6),
        client_sees in 0usize..6,
    ) {
        run_resync_case(chunks, client_sees);
    }
}
