use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use collabhub::application::ports::document_repository::DocumentRepository;
use collabhub::domain::document::Document;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory stand-in for the metadata store's document-facing port, used
/// to exercise the hub's services (registry, snapshot) without a database.
#[derive(Default)]
pub struct InMemoryDocumentRepository {
    docs: Mutex<HashMap<Uuid, Document>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, document: Document) {
        self.docs.lock().await.insert(document.id, document);
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn find_for_access(
        &self,
        document_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<Document>> {
        let docs = self.docs.lock().await;
        Ok(docs
            .get(&document_id)
            .filter(|d| d.role_of(user_id).is_some())
            .cloned())
    }

    async fn load(&self, document_id: Uuid) -> anyhow::Result<Option<Document>> {
        Ok(self.docs.lock().await.get(&document_id).cloned())
    }

    async fn persist_snapshot(&self, document_id: Uuid, blob: &[u8]) -> anyhow::Result<()> {
        if let Some(doc) = self.docs.lock().await.get_mut(&document_id) {
            doc.snapshot_blob = blob.to_vec();
        }
        Ok(())
    }
}

pub fn blank_document(id: Uuid, owner: Uuid) -> Document {
    Document {
        id,
        title: "Untitled".into(),
        owner_id: owner,
        collaborators: Vec::new(),
        snapshot_blob: Vec::new(),
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    }
}
