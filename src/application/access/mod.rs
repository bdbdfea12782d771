use thiserror::Error;
use uuid::Uuid;

use crate::application::ports::document_repository::DocumentRepository;
use crate::domain::document::Role;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("document not found or access denied")]
    NotFound,
    #[error("viewer role cannot perform this action")]
    Forbidden,
}

/// Resolves `user_id`'s role on `document_id`, or `AccessError::NotFound` if
/// the user has no relation to the document (§4.2). Invoked on join, rejoin,
/// and again on every `yjs-update` to catch a mid-session role change.
pub async fn resolve_role<D>(
    documents: &D,
    document_id: Uuid,
    user_id: Uuid,
) -> Result<Role, AccessError>
where
    D: DocumentRepository + ?Sized,
{
    let doc = documents
        .find_for_access(document_id, user_id)
        .await
        .map_err(|_| AccessError::NotFound)?
        .ok_or(AccessError::NotFound)?;
    doc.role_of(user_id).ok_or(AccessError::NotFound)
}

/// §4.2 capability matrix: every role may read and send awareness; only
/// owner/editor may mutate.
pub fn require_update(role: Role) -> Result<(), AccessError> {
    if role.can_update() {
        Ok(())
    } else {
        Err(AccessError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::domain::document::{Collaborator, Document};

    struct FakeDocuments(Document);

    #[async_trait]
    impl DocumentRepository for FakeDocuments {
        async fn find_for_access(
            &self,
            document_id: Uuid,
            user_id: Uuid,
        ) -> anyhow::Result<Option<Document>> {
            if document_id != self.0.id || self.0.role_of(user_id).is_none() {
                return Ok(None);
            }
            Ok(Some(self.0.clone()))
        }

        async fn load(&self, _document_id: Uuid) -> anyhow::Result<Option<Document>> {
            Ok(Some(self.0.clone()))
        }

        async fn persist_snapshot(&self, _document_id: Uuid, _blob: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn sample_document(owner: Uuid, viewer: Uuid) -> Document {
        Document {
            id: Uuid::new_v4(),
            title: "Untitled".into(),
            owner_id: owner,
            collaborators: vec![Collaborator {
                user_id: viewer,
                role: Role::Viewer,
            }],
            snapshot_blob: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn owner_resolves_and_may_update() {
        let owner = Uuid::new_v4();
        let doc = sample_document(owner, Uuid::new_v4());
        let doc_id = doc.id;
        let repo = FakeDocuments(doc);
        let role = resolve_role(&repo, doc_id, owner).await.unwrap();
        assert_eq!(role, Role::Owner);
        assert!(require_update(role).is_ok());
    }

    #[tokio::test]
    async fn viewer_resolves_but_may_not_update() {
        let owner = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let doc = sample_document(owner, viewer);
        let doc_id = doc.id;
        let repo = FakeDocuments(doc);
        let role = resolve_role(&repo, doc_id, viewer).await.unwrap();
        assert_eq!(role, Role::Viewer);
        assert!(matches!(require_update(role), Err(AccessError::Forbidden)));
    }

    #[tokio::test]
    async fn stranger_is_not_found() {
        let owner = Uuid::new_v4();
        let doc = sample_document(owner, Uuid::new_v4());
        let doc_id = doc.id;
        let repo = FakeDocuments(doc);
        let err = resolve_role(&repo, doc_id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AccessError::NotFound));
    }
}
