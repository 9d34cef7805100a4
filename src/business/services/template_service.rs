//! 模板缓存服务
//!
//! 模板读取的旁路缓存（主键 + slug二级键），
//! 搜索与热门列表经分层缓存承载，键为条件指纹 + 时间范围。
//! 正文大字段读取绕过缓存；写路径一律失效，不回填。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::entity_cache::EntityCache;
use super::popularity::PopularityScorer;
use crate::business::domain::{CachedTemplate, TemplateRecord};
use crate::infrastructure::cache::{CacheKeyBuilder, TieredCache};
use crate::infrastructure::config::CacheSettings;
use crate::infrastructure::storage::SharedDocumentStore;
use crate::shared::types::{EntityKind, Timeframe};
use crate::shared::utils::sha256_hex;
use crate::shared::AppResult;

const NAMESPACE: &str = "template";

/// 模板搜索条件
///
/// 序列化形态即缓存键指纹的输入，字段顺序保持稳定。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSearchQuery {
    pub text: Option<String>,
    pub category_id: Option<String>,
    pub timeframe: Timeframe,
    pub limit: usize,
}

impl Default for TemplateSearchQuery {
    fn default() -> Self {
        Self {
            text: None,
            category_id: None,
            timeframe: Timeframe::All,
            limit: 20,
        }
    }
}

/// 模板缓存服务
pub struct TemplateCacheService {
    store: SharedDocumentStore,
    cache: EntityCache<CachedTemplate>,
    /// 搜索与热门列表走分层缓存（远端可共享，本地兜底）
    tiered: Arc<TieredCache>,
    keys: CacheKeyBuilder,
    search_ttl: Duration,
}

impl TemplateCacheService {
    pub fn new(
        store: SharedDocumentStore,
        tiered: Arc<TieredCache>,
        keys: CacheKeyBuilder,
        settings: &CacheSettings,
    ) -> Self {
        let cache = EntityCache::new(
            NAMESPACE,
            crate::shared::constants::entity_cache::MAX_ENTRIES,
            Duration::from_millis(settings.template_ttl_ms),
            Duration::from_millis(settings.sweep_interval_ms),
            keys.clone(),
        );
        Self {
            store,
            cache,
            tiered,
            keys,
            search_ttl: Duration::from_millis(settings.search_ttl_ms),
        }
    }

    /// 按id读取模板投影（旁路缓存）
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<CachedTemplate>> {
        if let Some(cached) = self.cache.get_by_id(id).await {
            debug!("模板缓存命中: id={}", id);
            return Ok(Some(cached));
        }

        let Some(doc) = self
            .store
            .find_by_id(EntityKind::Template.collection(), id)
            .await?
        else {
            return Ok(None);
        };

        let record: TemplateRecord = serde_json::from_value(doc)?;
        let cached = CachedTemplate::from(&record);
        self.prime(&cached).await;
        Ok(Some(cached))
    }

    /// 按id读取完整记录（含正文大字段），绕过缓存
    pub async fn find_with_body(&self, id: &str) -> AppResult<Option<TemplateRecord>> {
        let Some(doc) = self
            .store
            .find_by_id(EntityKind::Template.collection(), id)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(doc)?))
    }

    /// 按slug读取模板投影（旁路缓存）
    pub async fn find_by_slug(&self, slug: &str) -> AppResult<Option<CachedTemplate>> {
        if let Some(cached) = self.cache.get_by_secondary("slug", slug).await {
            debug!("模板缓存命中: slug={}", slug);
            return Ok(Some(cached));
        }

        let mut filter = Map::new();
        filter.insert("slug".to_string(), json!(slug));

        let Some(doc) = self
            .store
            .find_one(EntityKind::Template.collection(), &filter)
            .await?
        else {
            return Ok(None);
        };

        let record: TemplateRecord = serde_json::from_value(doc)?;
        let cached = CachedTemplate::from(&record);
        self.prime(&cached).await;
        Ok(Some(cached))
    }

    /// 创建模板；新条目会改变各类列表，相关列表缓存整体失效
    pub async fn create(&self, mut record: TemplateRecord) -> AppResult<TemplateRecord> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        let doc = serde_json::to_value(&record)?;
        self.store
            .insert(EntityKind::Template.collection(), doc)
            .await?;
        self.invalidate_listings().await;

        info!("模板已创建: id={}, slug={}", record.id, record.slug);
        Ok(record)
    }

    /// 更新模板：写穿存储后失效主键、新旧slug键与列表缓存
    pub async fn update(
        &self,
        id: &str,
        patch: &Map<String, Value>,
    ) -> AppResult<Option<CachedTemplate>> {
        let old_slug = self
            .store
            .find_by_id(EntityKind::Template.collection(), id)
            .await?
            .and_then(|doc| doc.get("slug").and_then(Value::as_str).map(str::to_string));

        let Some(updated) = self
            .store
            .update_by_id(EntityKind::Template.collection(), id, patch)
            .await?
        else {
            return Ok(None);
        };
        let record: TemplateRecord = serde_json::from_value(updated)?;

        self.cache.evict_id(id).await;
        if let Some(slug) = old_slug {
            self.cache.evict_secondary("slug", &slug).await;
        }
        self.cache.evict_secondary("slug", &record.slug).await;
        self.invalidate_listings().await;

        debug!("模板更新完成并失效缓存: id={}", id);
        Ok(Some(CachedTemplate::from(&record)))
    }

    /// 删除模板：持久删除前后都清掉缓存条目
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let slug = self
            .store
            .find_by_id(EntityKind::Template.collection(), id)
            .await?
            .and_then(|doc| doc.get("slug").and_then(Value::as_str).map(str::to_string));

        self.evict_entries(id, slug.as_deref()).await;
        let deleted = self
            .store
            .delete_by_id(EntityKind::Template.collection(), id)
            .await?;
        self.evict_entries(id, slug.as_deref()).await;
        self.invalidate_listings().await;

        if deleted {
            info!("模板已删除: id={}", id);
        }
        Ok(deleted)
    }

    /// 记录一次下载（参与度计数 + 失效相关缓存）
    pub async fn record_download(&self, id: &str) -> AppResult<Option<CachedTemplate>> {
        self.bump_counter(id, "downloads").await
    }

    /// 记录一次浏览
    pub async fn record_view(&self, id: &str) -> AppResult<Option<CachedTemplate>> {
        self.bump_counter(id, "views").await
    }

    /// 搜索模板
    ///
    /// 结果经分层缓存承载；时间范围在打分前收缩候选集。
    pub async fn search(&self, query: &TemplateSearchQuery) -> AppResult<Vec<CachedTemplate>> {
        let fingerprint = sha256_hex(&serde_json::to_string(query)?);
        let key = self.keys.search_key(&fingerprint, query.timeframe.as_key());

        if let Some(cached) = self.tiered.get::<Vec<CachedTemplate>>(&key).await {
            debug!("搜索结果缓存命中: key={}", key);
            return Ok(cached);
        }

        let mut filter = Map::new();
        if let Some(category_id) = &query.category_id {
            filter.insert("category_id".to_string(), json!(category_id));
        }
        let docs = self
            .store
            .find_many(EntityKind::Template.collection(), &filter, None)
            .await?;

        let now = Utc::now();
        let cutoff = query.timeframe.cutoff(now);
        let needle = query.text.as_deref().map(str::to_lowercase);

        let mut candidates = Vec::new();
        for doc in docs {
            let record: TemplateRecord = match serde_json::from_value(doc) {
                Ok(record) => record,
                Err(e) => {
                    warn!("跳过无法解析的模板文档: {}", e);
                    continue;
                }
            };

            // 时间范围限制候选集（先于打分，而不是排序后截断）
            if let Some(cutoff) = cutoff {
                if record.created_at < cutoff {
                    continue;
                }
            }

            if let Some(needle) = &needle {
                let haystack = format!(
                    "{} {}",
                    record.title.to_lowercase(),
                    record.description.to_lowercase()
                );
                if !haystack.contains(needle.as_str()) {
                    continue;
                }
            }

            candidates.push(CachedTemplate::from(&record));
        }

        let mut ranked = PopularityScorer::rank(candidates, now);
        if query.limit > 0 {
            ranked.truncate(query.limit);
        }

        self.tiered.set(&key, &ranked, Some(self.search_ttl)).await;
        Ok(ranked)
    }

    /// 热门模板列表
    pub async fn popular(
        &self,
        timeframe: Timeframe,
        limit: usize,
    ) -> AppResult<Vec<CachedTemplate>> {
        let key = self.keys.popular_key(timeframe.as_key(), limit);

        if let Some(cached) = self.tiered.get::<Vec<CachedTemplate>>(&key).await {
            debug!("热门列表缓存命中: key={}", key);
            return Ok(cached);
        }

        let docs = self
            .store
            .find_many(EntityKind::Template.collection(), &Map::new(), None)
            .await?;

        let now = Utc::now();
        let cutoff = timeframe.cutoff(now);
        let mut candidates = Vec::new();
        for doc in docs {
            let record: TemplateRecord = match serde_json::from_value(doc) {
                Ok(record) => record,
                Err(e) => {
                    warn!("跳过无法解析的模板文档: {}", e);
                    continue;
                }
            };
            if let Some(cutoff) = cutoff {
                if record.created_at < cutoff {
                    continue;
                }
            }
            candidates.push(CachedTemplate::from(&record));
        }

        let mut ranked = PopularityScorer::rank(candidates, now);
        if limit > 0 {
            ranked.truncate(limit);
        }

        self.tiered.set(&key, &ranked, Some(self.search_ttl)).await;
        Ok(ranked)
    }

    /// 清空模板缓存（实体条目 + 列表缓存）
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        self.invalidate_listings().await;
    }

    /// 停止后台任务
    pub fn close(&self) {
        self.cache.close();
    }

    async fn prime(&self, cached: &CachedTemplate) {
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

    /// 列表类缓存整体失效（搜索 + 热门）
    async fn invalidate_listings(&self) {
        self.tiered
            .invalidate_pattern(&self.keys.search_pattern())
            .await;
        self.tiered
            .invalidate_pattern(&self.keys.popular_pattern())
            .await;
    }

    /// 参与度计数自增：读当前值、写穿存储、失效实体与热门缓存
    async fn bump_counter(&self, id: &str, field: &str) -> AppResult<Option<CachedTemplate>> {
        let Some(doc) = self
            .store
            .find_by_id(EntityKind::Template.collection(), id)
            .await?
        else {
            return Ok(None);
        };

        let current = doc.get(field).and_then(Value::as_u64).unwrap_or(0);
        let slug = doc.get("slug").and_then(Value::as_str).map(str::to_string);

        let mut patch = Map::new();
        patch.insert(field.to_string(), json!(current + 1));

        let Some(updated) = self
            .store
            .update_by_id(EntityKind::Template.collection(), id, &patch)
            .await?
        else {
            return Ok(None);
        };
        let record: TemplateRecord = serde_json::from_value(updated)?;

        self.evict_entries(id, slug.as_deref()).await;
        // 参与度变化影响排行，热门列表立即失效；搜索结果靠短TTL自然过期
        self.tiered
            .invalidate_pattern(&self.keys.popular_pattern())
            .await;

        Ok(Some(CachedTemplate::from(&record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::TieredCacheConfig;
    use crate::infrastructure::storage::MemoryDocumentStore;
    use chrono::Duration as ChronoDuration;

    async fn service_with_store() -> (TemplateCacheService, Arc<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        let tiered = Arc::new(
            TieredCache::new(TieredCacheConfig {
                redis_url: None,
                ..TieredCacheConfig::default()
            })
            .await,
        );
        let service = TemplateCacheService::new(
            store.clone(),
            tiered,
            CacheKeyBuilder::new("test:"),
            &CacheSettings::load_from_env(),
        );
        (service, store)
    }

    fn sample_template(id: &str, slug: &str, downloads: u64) -> TemplateRecord {
        TemplateRecord {
            id: id.to_string(),
            slug: slug.to_string(),
            title: format!("模板 {}", slug),
            description: "通用描述".to_string(),
            author_id: "author".to_string(),
            category_id: "cat-1".to_string(),
            body_markdown: "# 正文".to_string(),
            downloads,
            rating: 4.0,
            review_count: 2,
            views: 100,
            featured: false,
            created_at: Utc::now() - ChronoDuration::days(1),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn find_by_slug_uses_secondary_key() {
        let (service, _store) = service_with_store().await;
        service
            .create(sample_template("t1", "invoice", 10))
            .await
            .unwrap();

        let by_slug = service.find_by_slug("invoice").await.unwrap().expect("应存在");
        assert_eq!(by_slug.id, "t1");

        let by_id = service.find_by_id("t1").await.unwrap().expect("应存在");
        assert_eq!(by_id.slug, "invoice");
        service.close();
    }

    #[tokio::test]
    async fn body_read_bypasses_cache() {
        let (service, _store) = service_with_store().await;
        service
            .create(sample_template("t1", "invoice", 10))
            .await
            .unwrap();

        let full = service.find_with_body("t1").await.unwrap().expect("应存在");
        assert_eq!(full.body_markdown, "# 正文");

        // 投影读取不携带正文
        let projected = service.find_by_id("t1").await.unwrap().expect("应存在");
        let serialized = serde_json::to_string(&projected).unwrap();
        assert!(!serialized.contains("正文"));
        service.close();
    }

    #[tokio::test]
    async fn no_stale_read_after_update() {
        let (service, _store) = service_with_store().await;
        service
            .create(sample_template("t1", "invoice", 10))
            .await
            .unwrap();
        service.find_by_id("t1").await.unwrap();

        let mut patch = Map::new();
        patch.insert("title".to_string(), json!("新标题"));
        service.update("t1", &patch).await.unwrap();

        let after = service.find_by_id("t1").await.unwrap().expect("应存在");
        assert_eq!(after.title, "新标题", "更新后不得读到补丁前的缓存值");
        service.close();
    }

    #[tokio::test]
    async fn search_caches_and_search_invalidated_on_update() {
        let (service, _store) = service_with_store().await;
        service
            .create(sample_template("t1", "invoice", 50))
            .await
            .unwrap();
        service
            .create(sample_template("t2", "report", 10))
            .await
            .unwrap();

        let query = TemplateSearchQuery::default();
        let first = service.search(&query).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, "t1", "下载量高者排前");

        // 更新触发列表失效：同一查询立即反映新标题，不等TTL
        let mut patch = Map::new();
        patch.insert("title".to_string(), json!("独特关键词"));
        service.update("t2", &patch).await.unwrap();

        let refreshed = service.search(&query).await.unwrap();
        let t2 = refreshed.iter().find(|t| t.id == "t2").expect("应存在");
        assert_eq!(t2.title, "独特关键词");

        let filtered = service
            .search(&TemplateSearchQuery {
                text: Some("独特关键词".to_string()),
                ..TemplateSearchQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "t2");
        service.close();
    }

    #[tokio::test]
    async fn timeframe_restricts_candidates_before_scoring() {
        let (service, _store) = service_with_store().await;

        // 旧模板参与度极高，新模板较低
        let mut old = sample_template("old", "old-tpl", 10_000);
        old.created_at = Utc::now() - ChronoDuration::days(100);
        service.create(old).await.unwrap();
        service
            .create(sample_template("new", "new-tpl", 1))
            .await
            .unwrap();

        // 周榜只认最近7天创建的候选：旧模板分再高也不得入围
        let weekly = service.popular(Timeframe::Week, 10).await.unwrap();
        let ids: Vec<&str> = weekly.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["new"]);

        let all_time = service.popular(Timeframe::All, 10).await.unwrap();
        assert_eq!(all_time[0].id, "old");
        service.close();
    }

    #[tokio::test]
    async fn record_download_bumps_counter_and_evicts() {
        let (service, _store) = service_with_store().await;
        service
            .create(sample_template("t1", "invoice", 10))
            .await
            .unwrap();
        service.find_by_id("t1").await.unwrap();

        let bumped = service.record_download("t1").await.unwrap().expect("应存在");
        assert_eq!(bumped.downloads, 11);

        let after = service.find_by_id("t1").await.unwrap().expect("应存在");
        assert_eq!(after.downloads, 11, "计数自增后不得读到旧缓存");
        service.close();
    }
}
