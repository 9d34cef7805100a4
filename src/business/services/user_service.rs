//! 用户缓存服务
//!
//! 用户读取的旁路缓存：主键与邮箱二级键分别命名空间化缓存。
//! 涉及凭证的读取完全绕过缓存，凭证哈希永不落入任何缓存层。
//! 写路径一律"写穿存储 + 失效缓存"，绝不回填刷新。

use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::entity_cache::EntityCache;
use crate::business::domain::{CachedUser, UserRecord};
use crate::infrastructure::cache::CacheKeyBuilder;
use crate::infrastructure::config::CacheSettings;
use crate::infrastructure::storage::SharedDocumentStore;
use crate::shared::types::EntityKind;
use crate::shared::AppResult;

const NAMESPACE: &str = "user";

/// 用户缓存服务
pub struct UserCacheService {
    store: SharedDocumentStore,
    cache: EntityCache<CachedUser>,
}

impl UserCacheService {
    pub fn new(store: SharedDocumentStore, keys: CacheKeyBuilder, settings: &CacheSettings) -> Self {
        let cache = EntityCache::new(
            NAMESPACE,
            crate::shared::constants::entity_cache::MAX_ENTRIES,
            Duration::from_millis(settings.user_ttl_ms),
            Duration::from_millis(settings.sweep_interval_ms),
            keys,
        );
        Self { store, cache }
    }

    /// 按id读取用户投影（旁路缓存）
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<CachedUser>> {
        if let Some(cached) = self.cache.get_by_id(id).await {
            debug!("用户缓存命中: id={}", id);
            return Ok(Some(cached));
        }

        let Some(doc) = self
            .store
            .find_by_id(EntityKind::User.collection(), id)
            .await?
        else {
            return Ok(None);
        };

        let record: UserRecord = serde_json::from_value(doc)?;
        let cached = CachedUser::from(&record);
        self.prime(&cached).await;
        Ok(Some(cached))
    }

    /// 按id读取完整记录（含凭证哈希）
    ///
    /// 敏感字段读取完全绕过缓存，直接回源。
    pub async fn find_with_credentials(&self, id: &str) -> AppResult<Option<UserRecord>> {
        let Some(doc) = self
            .store
            .find_by_id(EntityKind::User.collection(), id)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(doc)?))
    }

    /// 按邮箱读取用户投影（旁路缓存，独立命名空间的二级键）
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<CachedUser>> {
        if let Some(cached) = self.cache.get_by_secondary("email", email).await {
            debug!("用户缓存命中: email={}", email);
            return Ok(Some(cached));
        }

        let mut filter = Map::new();
        filter.insert("email".to_string(), json!(email));

        let Some(doc) = self
            .store
            .find_one(EntityKind::User.collection(), &filter)
            .await?
        else {
            return Ok(None);
        };

        let record: UserRecord = serde_json::from_value(doc)?;
        let cached = CachedUser::from(&record);
        self.prime(&cached).await;
        Ok(Some(cached))
    }

    /// 创建用户
    pub async fn create(&self, mut record: UserRecord) -> AppResult<UserRecord> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        let doc = serde_json::to_value(&record)?;
        self.store.insert(EntityKind::User.collection(), doc).await?;
        info!("用户已创建: id={}", record.id);
        Ok(record)
    }

    /// 更新用户：写穿存储后无条件失效相关缓存条目
    ///
    /// 失效覆盖更新前后两个邮箱键，补丁改邮箱时旧键也不会残留。
    pub async fn update(&self, id: &str, patch: &Map<String, Value>) -> AppResult<Option<CachedUser>> {
        let old_email = self
            .store
            .find_by_id(EntityKind::User.collection(), id)
            .await?
            .and_then(|doc| {
                doc.get("email")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });

        let Some(updated) = self
            .store
            .update_by_id(EntityKind::User.collection(), id, patch)
            .await?
        else {
            return Ok(None);
        };
        let record: UserRecord = serde_json::from_value(updated)?;

        self.cache.evict_id(id).await;
        if let Some(email) = old_email {
            self.cache.evict_secondary("email", &email).await;
        }
        self.cache.evict_secondary("email", &record.email).await;

        debug!("用户更新完成并失效缓存: id={}", id);
        Ok(Some(CachedUser::from(&record)))
    }

    /// 删除用户：持久删除前后都清掉缓存条目
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let email = self
            .store
            .find_by_id(EntityKind::User.collection(), id)
            .await?
            .and_then(|doc| {
                doc.get("email")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });

        self.evict_entries(id, email.as_deref()).await;
        let deleted = self
            .store
            .delete_by_id(EntityKind::User.collection(), id)
            .await?;
        self.evict_entries(id, email.as_deref()).await;

        if deleted {
            info!("用户已删除: id={}", id);
        }
        Ok(deleted)
    }

    /// 清空用户缓存
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// 停止后台任务
    pub fn close(&self) {
        self.cache.close();
    }

    async fn prime(&self, cached: &CachedUser) {
        self.cache.put(&cached.id, cached.clone()).await;
        self.cache
            .put_secondary("email", &cached.email, cached.clone())
            .await;
    }

    async fn evict_entries(&self, id: &str, email: Option<&str>) {
        self.cache.evict_id(id).await;
        if let Some(email) = email {
            self.cache.evict_secondary("email", email).await;
        }
    }
}
