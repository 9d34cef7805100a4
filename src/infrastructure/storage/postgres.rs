//! Postgres文档存储实现
//!
//! 单表JSONB方案：`documents(collection, id, data)`，
//! 过滤查询走JSONB包含匹配，更新为顶层字段合并。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use super::{ensure_document_id, DocumentStore, StorageError};

/// Postgres文档存储
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// 创建连接池并确保表结构就绪
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!("✅ 文档存储连接池初始化成功");
        Ok(store)
    }

    /// 获取连接池（供调用方做迁移等运维操作）
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 建表与索引
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data JSONB NOT NULL,
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_data
             ON documents USING GIN (data jsonb_path_ops)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, collection: &str, mut doc: Value) -> Result<String, StorageError> {
        let id = ensure_document_id(&mut doc)?;

        sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)
             ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(collection)
        .bind(&id)
        .bind(&doc)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<Value, _>("data")))
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Value>, StorageError> {
        let row = sqlx::query(
            "SELECT data FROM documents
             WHERE collection = $1 AND data @> $2
             ORDER BY id
             LIMIT 1",
        )
        .bind(collection)
        .bind(Value::Object(filter.clone()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get::<Value, _>("data")))
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StorageError> {
        // LIMIT NULL等价于不限制，避免拼接两套SQL
        let rows = sqlx::query(
            "SELECT data FROM documents
             WHERE collection = $1 AND data @> $2
             ORDER BY id
             LIMIT $3",
        )
        .bind(collection)
        .bind(Value::Object(filter.clone()))
        .bind(limit.map(|n| n as i64))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get::<Value, _>("data")).collect())
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Option<Value>, StorageError> {
        // 合并顶层字段；主键字段始终以列值为准，补丁无法改写
        let row = sqlx::query(
            "UPDATE documents
             SET data = (data || $3) || jsonb_build_object('id', id)
             WHERE collection = $1 AND id = $2
             RETURNING data",
        )
        .bind(collection)
        .bind(id)
        .bind(Value::Object(patch.clone()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get::<Value, _>("data")))
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    #[ignore] // 需要Postgres实例才能运行
    async fn pg_document_roundtrip() {
        let url = std::env::var("STORAGE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/template_hub_test".to_string());
        let store = PgDocumentStore::new(&url).await.expect("连接失败");

        let id = store
            .insert("it_docs", json!({"title": "测试文档", "views": 1}))
            .await
            .expect("插入失败");

        let doc = store.find_by_id("it_docs", &id).await.unwrap().expect("应存在");
        assert_eq!(doc["title"], "测试文档");

        let mut patch = Map::new();
        patch.insert("views".to_string(), json!(2));
        let updated = store
            .update_by_id("it_docs", &id, &patch)
            .await
            .unwrap()
            .expect("应存在");
        assert_eq!(updated["views"], 2);

        assert!(store.delete_by_id("it_docs", &id).await.unwrap());
    }
}
