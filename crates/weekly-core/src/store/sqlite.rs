use async_trait::async_trait;
use chrono::Utc;

use super::DocumentStore;
use crate::db::DbPool;
use crate::error::CoreError;

/// Document store backed by the `documents` table.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: DbPool,
}

impl SqliteDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let body: Option<(String,)> = sqlx::query_as("SELECT body FROM documents WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(body.map(|(body,)| body))
    }

    async fn put(&self, key: &str, body: &str) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO documents (key, body, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_put_overwrites() {
        let pool = db::establish_in_memory().await.unwrap();
        let store = SqliteDocumentStore::new(pool);
        assert_eq!(store.get("k").await.unwrap(), None);
        store.put("k", "one").await.unwrap();
        store.put("k", "two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
    }
}
