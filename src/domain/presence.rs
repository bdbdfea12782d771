use uuid::Uuid;

use super::document::Role;

/// The identity tuple presence associates with one session subscribed to a
/// room. Distinct from `Identity`: it also carries the role resolved at
/// join/rejoin time, which the dispatcher re-checks on every mutation.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub user_id: Uuid,
    pub display_name: String,
    pub email: String,
    pub role: Role,
}
