use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::application::ports::user_repository::UserRepository;
use crate::domain::identity::Identity;
use crate::infrastructure::db::PgPool;

pub struct SqlxUserRepository {
    pool: PgPool,
}

impl SqlxUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Identity>> {
        let row = sqlx::query(r#"SELECT id, email FROM users WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Identity {
            id: r.get("id"),
            email: r.get("email"),
        }))
    }
}
