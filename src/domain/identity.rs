use uuid::Uuid;

/// A verified user identity, produced by the auth gate (C1) after
/// credential validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}
