use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A collaborator's role on a document. Ordered so `role >= Editor` reads
/// naturally as "may mutate".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Viewer,
    Editor,
    Owner,
}

impl Role {
    pub fn can_update(self) -> bool {
        self >= Role::Editor
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collaborator {
    pub user_id: Uuid,
    pub role: Role,
}

/// The metadata-store projection of a document. `snapshot_blob` is the only
/// durable representation of its content (the yrs-encoded full state); it is
/// loaded into an authoritative replica on first activation and overwritten
/// on every successful save (§4.4).
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub owner_id: Uuid,
    pub collaborators: Vec<Collaborator>,
    pub snapshot_blob: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Resolves `user_id`'s role against the owner field and the
    /// collaborator list. Returns `None` if the user has no relation to the
    /// document at all -- the caller must treat this identically to "the
    /// document does not exist" to avoid enumeration (§4.2).
    pub fn role_of(&self, user_id: Uuid) -> Option<Role> {
        if user_id == self.owner_id {
            return Some(Role::Owner);
        }
        self.collaborators
            .iter()
            .find(|c| c.user_id == user_id)
            .map(|c| c.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc_with(owner: Uuid, collaborators: Vec<Collaborator>) -> Document {
        Document {
            id: Uuid::new_v4(),
            title: "Untitled".into(),
            owner_id: owner,
            collaborators,
            snapshot_blob: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn owner_resolves_to_owner_role() {
        let owner = Uuid::new_v4();
        let doc = doc_with(owner, vec![]);
        assert_eq!(doc.role_of(owner), Some(Role::Owner));
    }

    #[test]
    fn collaborator_resolves_to_its_listed_role() {
        let owner = Uuid::new_v4();
        let editor = Uuid::new_v4();
        let doc = doc_with(
            owner,
            vec![Collaborator {
                user_id: editor,
                role: Role::Editor,
            }],
        );
        assert_eq!(doc.role_of(editor), Some(Role::Editor));
    }

    #[test]
    fn stranger_resolves_to_none() {
        let doc = doc_with(Uuid::new_v4(), vec![]);
        assert_eq!(doc.role_of(Uuid::new_v4()), None);
    }

    #[test]
    fn viewer_cannot_update_but_editor_and_owner_can() {
        assert!(!Role::Viewer.can_update());
        assert!(Role::Editor.can_update());
        assert!(Role::Owner.can_update());
    }
}
