use uuid::Uuid;

use crate::application::services::replica_registry::ReplicaRegistry;

/// C8. Computes the diff between a client's reported state vector and the
/// authoritative replica, falling back to the full state if the vector is
/// absent or malformed (§4.8). This is a thin wrapper over
/// `ReplicaRegistry::encode_diff` -- kept as its own component because the
/// dispatcher calls it from two distinct message handlers (`rejoin-document`
/// and, in principle, any future explicit resync request) and the spec
/// names it as a separate testable property (§8 "Resync idempotence").
pub async fn diff_for_rejoin(
    registry: &ReplicaRegistry,
    document_id: Uuid,
    client_state_vector: Option<&[u8]>,
) -> anyhow::Result<Vec<u8>> {
    registry.encode_diff(document_id, client_state_vector).await
}
