use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::identity::Identity;

/// The external user store (§6). Account creation, password hashing and
/// credential issuance live outside this crate; this port only needs to
/// resolve an id to the display fields the hub hands out in presence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Identity>>;
}
