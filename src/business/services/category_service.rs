//! 分类缓存服务
//!
//! 分类数量少、读多写少：实体条目走本地旁路缓存，
//! 全量列表作为单条目经分层缓存承载。

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::entity_cache::EntityCache;
use crate::business::domain::{CachedCategory, CategoryRecord};
use crate::infrastructure::cache::{CacheKeyBuilder, TieredCache};
use crate::infrastructure::config::CacheSettings;
use crate::infrastructure::storage::SharedDocumentStore;
use crate::shared::types::EntityKind;
use crate::shared::AppResult;

const NAMESPACE: &str = "category";

/// 分类缓存服务
pub struct CategoryCacheService {
    store: SharedDocumentStore,
    cache: EntityCache<CachedCategory>,
    tiered: Arc<TieredCache>,
    keys: CacheKeyBuilder,
    list_ttl: Duration,
}

impl CategoryCacheService {
    pub fn new(
        store: SharedDocumentStore,
        tiered: Arc<TieredCache>,
        keys: CacheKeyBuilder,
        settings: &CacheSettings,
    ) -> Self {
        let cache = EntityCache::new(
            NAMESPACE,
            crate::shared::constants::entity_cache::MAX_ENTRIES,
            Duration::from_millis(settings.category_ttl_ms),
            Duration::from_millis(settings.sweep_interval_ms),
            keys.clone(),
        );
        Self {
            store,
            cache,
            tiered,
            keys,
            list_ttl: Duration::from_millis(settings.category_ttl_ms),
        }
    }

    /// 按id读取分类投影（旁路缓存）
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<CachedCategory>> {
        if let Some(cached) = self.cache.get_by_id(id).await {
            debug!("分类缓存命中: id={}", id);
            return Ok(Some(cached));
        }

        let Some(doc) = self
            .store
            .find_by_id(EntityKind::Category.collection(), id)
            .await?
        else {
            return Ok(None);
        };

        let record: CategoryRecord = serde_json::from_value(doc)?;
        let cached = CachedCategory::from(&record);
        self.prime(&cached).await;
        Ok(Some(cached))
    }

    /// 按slug读取分类投影（旁路缓存）
    pub async fn find_by_slug(&self, slug: &str) -> AppResult<Option<CachedCategory>> {
        if let Some(cached) = self.cache.get_by_secondary("slug", slug).await {
            debug!("分类缓存命中: slug={}", slug);
            return Ok(Some(cached));
        }

        let mut filter = Map::new();
        filter.insert("slug".to_string(), json!(slug));

        let Some(doc) = self
            .store
            .find_one(EntityKind::Category.collection(), &filter)
            .await?
        else {
            return Ok(None);
        };

        let record: CategoryRecord = serde_json::from_value(doc)?;
        let cached = CachedCategory::from(&record);
        self.prime(&cached).await;
        Ok(Some(cached))
    }

    /// 全量分类列表（按名称排序，整体作为一个缓存条目）
    pub async fn list_all(&self) -> AppResult<Vec<CachedCategory>> {
        let key = self.list_key();
        if let Some(cached) = self.tiered.get::<Vec<CachedCategory>>(&key).await {
            debug!("分类列表缓存命中");
            return Ok(cached);
        }

        let docs = self
            .store
            .find_many(EntityKind::Category.collection(), &Map::new(), None)
            .await?;

        let mut categories = Vec::with_capacity(docs.len());
        for doc in docs {
            let record: CategoryRecord = serde_json::from_value(doc)?;
            categories.push(CachedCategory::from(&record));
        }
        categories.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        self.tiered
            .set(&key, &categories, Some(self.list_ttl))
            .await;
        Ok(categories)
    }

    /// 创建分类
    pub async fn create(&self, mut record: CategoryRecord) -> AppResult<CategoryRecord> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        let doc = serde_json::to_value(&record)?;
        self.store
            .insert(EntityKind::Category.collection(), doc)
            .await?;
        self.tiered.delete(&self.list_key()).await;

        info!("分类已创建: id={}, slug={}", record.id, record.slug);
        Ok(record)
    }

    /// 更新分类：写穿存储后失效主键、新旧slug键与列表条目
    pub async fn update(
        &self,
        id: &str,
        patch: &Map<String, Value>,
    ) -> AppResult<Option<CachedCategory>> {
        let old_slug = self
            .store
            .find_by_id(EntityKind::Category.collection(), id)
            .await?
            .and_then(|doc| doc.get("slug").and_then(Value::as_str).map(str::to_string));

        let Some(updated) = self
            .store
            .update_by_id(EntityKind::Category.collection(), id, patch)
            .await?
        else {
            return Ok(None);
        };
        let record: CategoryRecord = serde_json::from_value(updated)?;

        self.cache.evict_id(id).await;
        if let Some(slug) = old_slug {
            self.cache.evict_secondary("slug", &slug).await;
        }
        self.cache.evict_secondary("slug", &record.slug).await;
        self.tiered.delete(&self.list_key()).await;

        debug!("分类更新完成并失效缓存: id={}", id);
        Ok(Some(CachedCategory::from(&record)))
    }

    /// 删除分类：持久删除前后都清掉缓存条目
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let slug = self
            .store
            .find_by_id(EntityKind::Category.collection(), id)
            .await?
            .and_then(|doc| doc.get("slug").and_then(Value::as_str).map(str::to_string));

        self.evict_entries(id, slug.as_deref()).await;
        let deleted = self
            .store
            .delete_by_id(EntityKind::Category.collection(), id)
            .await?;
        self.evict_entries(id, slug.as_deref()).await;
        self.tiered.delete(&self.list_key()).await;

        if deleted {
            info!("分类已删除: id={}", id);
        }
        Ok(deleted)
    }

    /// 清空分类缓存
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        self.tiered.delete(&self.list_key()).await;
    }

    /// 停止后台任务
    pub fn close(&self) {
        self.cache.close();
    }

    fn list_key(&self) -> String {
        self.keys.entity_secondary_key(NAMESPACE, "list", "all")
    }

    async fn prime(&self, cached: &CachedCategory) {
        self.cache.put(&cached.id, cached.clone()).await;
        self.cache
            .put_secondary("slug", &cached.slug, cached.clone())
            .await;
    }

    async fn evict_entries(&self, id: &str, slug: Option<&str>) {
        self.cache.evict_id(id).await;
        if let Some(slug) = slug {
            self.cache.evict_secondary("slug", slug).await;
        }
    }
}
