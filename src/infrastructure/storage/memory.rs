//! 内存文档存储实现
//!
//! 供测试与本地开发使用，语义与生产实现保持一致：
//! 移除缓存层后所有读取结果必须与直接访问这里完全相同。

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{ensure_document_id, matches_filter, DocumentStore, StorageError};

/// 内存文档存储
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前集合内文档数（测试辅助）
    pub async fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map_or(0, |docs| docs.len())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, collection: &str, mut doc: Value) -> Result<String, StorageError> {
        let id = ensure_document_id(&mut doc)?;

        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), doc);
        Ok(id)
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Value>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.values().find(|doc| matches_filter(doc, filter)))
            .cloned())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StorageError> {
        let collections = self.collections.read().await;
        let mut results: Vec<Value> = collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| matches_filter(doc, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // HashMap遍历顺序不稳定，按id排序保证结果可复现
        results.sort_by(|a, b| {
            let a_id = a.get("id").and_then(Value::as_str).unwrap_or_default();
            let b_id = b.get("id").and_then(Value::as_str).unwrap_or_default();
            a_id.cmp(b_id)
        });

        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Option<Value>, StorageError> {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
        else {
            return Ok(None);
        };

        let obj = doc
            .as_object_mut()
            .ok_or_else(|| StorageError::InvalidDocument("文档必须是JSON对象".to_string()))?;
        for (key, value) in patch {
            // 主键不允许被补丁改写
            if key == "id" {
                continue;
            }
            obj.insert(key.clone(), value.clone());
        }

        Ok(Some(doc.clone()))
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool, StorageError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .map_or(false, |docs| docs.remove(id).is_some()))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_id_when_missing() {
        let store = MemoryDocumentStore::new();

        let id = store
            .insert("users", json!({"email": "a@b.com"}))
            .await
            .expect("插入应成功");
        assert!(!id.is_empty());

        let doc = store.find_by_id("users", &id).await.unwrap().expect("应存在");
        assert_eq!(doc["email"], "a@b.com");
        assert_eq!(doc["id"], Value::String(id));
    }

    #[tokio::test]
    async fn find_one_by_filter() {
        let store = MemoryDocumentStore::new();
        store
            .insert("users", json!({"id": "u1", "email": "a@b.com"}))
            .await
            .unwrap();
        store
            .insert("users", json!({"id": "u2", "email": "c@d.com"}))
            .await
            .unwrap();

        let mut filter = Map::new();
        filter.insert("email".to_string(), json!("c@d.com"));

        let doc = store.find_one("users", &filter).await.unwrap().expect("应命中");
        assert_eq!(doc["id"], "u2");
    }

    #[tokio::test]
    async fn update_merges_top_level_fields_and_protects_id() {
        let store = MemoryDocumentStore::new();
        store
            .insert("templates", json!({"id": "t1", "title": "旧标题", "downloads": 3}))
            .await
            .unwrap();

        let mut patch = Map::new();
        patch.insert("title".to_string(), json!("新标题"));
        patch.insert("id".to_string(), json!("hacked"));

        let updated = store
            .update_by_id("templates", "t1", &patch)
            .await
            .unwrap()
            .expect("应存在");
        assert_eq!(updated["title"], "新标题");
        assert_eq!(updated["downloads"], 3, "未补丁字段保持不变");
        assert_eq!(updated["id"], "t1", "主键不可被改写");
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = MemoryDocumentStore::new();
        store.insert("users", json!({"id": "u1"})).await.unwrap();

        assert!(store.delete_by_id("users", "u1").await.unwrap());
        assert!(!store.delete_by_id("users", "u1").await.unwrap());
        assert!(store.find_by_id("users", "u1").await.unwrap().is_none());
    }
}
