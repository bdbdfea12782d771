use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::application::ports::document_repository::DocumentRepository;
use crate::domain::document::{Collaborator, Document, Role};
use crate::infrastructure::db::PgPool;

pub struct SqlxDocumentRepository {
    pool: PgPool,
}

impl SqlxDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_collaborators(&self, document_id: Uuid) -> anyhow::Result<Vec<Collaborator>> {
        let rows = sqlx::query(
            r#"SELECT user_id, role FROM document_collaborators WHERE document_id = $1"#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                let role_str: String = r.get("role");
                let role = parse_role(&role_str)?;
                Ok(Collaborator {
                    user_id: r.get("user_id"),
                    role,
                })
            })
            .collect()
    }

    async fn load_document(&self, document_id: Uuid) -> anyhow::Result<Option<Document>> {
        let row = sqlx::query(
            r#"SELECT id, title, owner_id, yjs_snapshot, created_at, updated_at
               FROM documents WHERE id = $1"#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let collaborators = self.load_collaborators(document_id).await?;
        Ok(Some(Document {
            id: row.get("id"),
            title: row.get("title"),
            owner_id: row.get("owner_id"),
            collaborators,
            snapshot_blob: row.try_get("yjs_snapshot").unwrap_or_default(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }
}

fn parse_role(s: &str) -> anyhow::Result<Role> {
    match s {
        "owner" => Ok(Role::Owner),
        "editor" => Ok(Role::Editor),
        "viewer" => Ok(Role::Viewer),
        other => anyhow::bail!("unknown collaborator role: {other}"),
    }
}

#[async_trait]
impl DocumentRepository for SqlxDocumentRepository {
    async fn find_for_access(
        &self,
        document_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<Document>> {
        let doc = self.load_document(document_id).await?;
        Ok(doc.filter(|d| d.role_of(user_id).is_some()))
    }

    async fn load(&self, document_id: Uuid) -> anyhow::Result<Option<Document>> {
        self.load_document(document_id).await
    }

    async fn persist_snapshot(&self, document_id: Uuid, blob: &[u8]) -> anyhow::Result<()> {
        sqlx::query(
            r#"UPDATE documents SET yjs_snapshot = $1, updated_at = now() WHERE id = $2"#,
        )
        .bind(blob)
        .bind(document_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
