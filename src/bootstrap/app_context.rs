use std::sync::Arc;

use crate::application::ports::document_repository::DocumentRepository;
use crate::application::ports::user_repository::UserRepository;
use crate::application::services::auth_gate::AuthGate;
use crate::application::services::replica_registry::ReplicaRegistry;
use crate::application::services::room_registry::RoomRegistry;
use crate::application::services::snapshot_service::SnapshotService;
use crate::bootstrap::config::Config;
use crate::infrastructure::db::PgPool;
use crate::presentation::ws::sessions::SessionRegistry;

/// Axum router state. Mirrors the teacher's `AppContext { cfg, services }`
/// split: configuration plus a bundle of shared service handles, all cheap
/// to clone per request/connection.
#[derive(Clone)]
pub struct AppContext {
    pub cfg: Arc<Config>,
    pub auth_gate: Arc<AuthGate<dyn UserRepository>>,
    pub documents: Arc<dyn DocumentRepository>,
    pub replicas: Arc<ReplicaRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub sessions: SessionRegistry,
    pub pool: PgPool,
}

impl AppContext {
    pub fn new(
        cfg: Arc<Config>,
        users: Arc<dyn UserRepository>,
        documents: Arc<dyn DocumentRepository>,
        pool: PgPool,
    ) -> Self {
        let auth_gate = Arc::new(AuthGate::new(users, cfg.clone()));
        let snapshots = Arc::new(SnapshotService::new(documents.clone()));
        let replicas = Arc::new(ReplicaRegistry::new(snapshots, cfg.replica_tunables()));
        let rooms = Arc::new(RoomRegistry::new());
        let sessions = SessionRegistry::new();
        Self {
            cfg,
            auth_gate,
            documents,
            replicas,
            rooms,
            sessions,
            pool,
        }
    }
}
