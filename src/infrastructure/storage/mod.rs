//! 文档存储访问模块
//!
//! 持久化存储是唯一的事实来源；缓存层只加速读取，从不代替它。
//! 通过统一的DocumentStore接口接入可插拔的文档存储，
//! 文档模式校验是存储方/调用方的职责，这里只做读写转运。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub mod memory;
pub mod postgres;

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

/// 存储层错误类型
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 数据库连接/执行错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    /// 文档格式非法（非对象、id缺失等）
    #[error("文档格式非法: {0}")]
    InvalidDocument(String),

    /// 存储配置错误
    #[error("存储配置错误: {0}")]
    Configuration(String),
}

/// 文档存储统一接口
///
/// 文档为JSON对象，主键为字符串`id`字段；过滤器为顶层字段的相等匹配。
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 插入文档，缺少id时自动生成，返回文档id
    async fn insert(&self, collection: &str, doc: Value) -> Result<String, StorageError>;

    /// 按id查询
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError>;

    /// 按过滤器查询单条
    async fn find_one(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Value>, StorageError>;

    /// 按过滤器查询多条
    async fn find_many(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StorageError>;

    /// 按id合并更新顶层字段，返回更新后的文档
    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Option<Value>, StorageError>;

    /// 按id删除，返回文档是否存在
    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool, StorageError>;

    /// 连通性检查
    async fn ping(&self) -> Result<(), StorageError>;
}

/// 共享的文档存储句柄
pub type SharedDocumentStore = Arc<dyn DocumentStore>;

/// 校验并取出文档id；必要时生成新id
pub(crate) fn ensure_document_id(doc: &mut Value) -> Result<String, StorageError> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| StorageError::InvalidDocument("文档必须是JSON对象".to_string()))?;

    match obj.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => {
            let id = uuid::Uuid::new_v4().to_string();
            obj.insert("id".to_string(), Value::String(id.clone()));
            Ok(id)
        }
    }
}

/// 顶层字段相等匹配
pub(crate) fn matches_filter(doc: &Value, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(key, expected)| doc.get(key) == Some(expected))
}
