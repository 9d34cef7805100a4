//! 实体缓存核心
//!
//! 旁路缓存（cache-aside）的共用底座：每类实体实例化一份，
//! 各自持有独立的有界映射与周期清扫任务。
//! 键一律经过命名空间拼装，主键与二级键（email、slug等）分开存放。

use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::infrastructure::cache::{CacheKeyBuilder, LocalCacheStats, SharedLocalCache};

/// 单实体缓存实例
#[derive(Debug)]
pub struct EntityCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    cache: SharedLocalCache<String, T>,
    keys: CacheKeyBuilder,
    namespace: &'static str,
    ttl: Duration,
    shutdown: watch::Sender<bool>,
}

impl<T> EntityCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// 创建实体缓存并启动周期清扫任务
    pub fn new(
        namespace: &'static str,
        capacity: usize,
        ttl: Duration,
        sweep_interval: Duration,
        keys: CacheKeyBuilder,
    ) -> Self {
        let cache: SharedLocalCache<String, T> = SharedLocalCache::new(capacity);
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let sweep_cache = cache.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep_cache.purge_expired().await;
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("实体缓存清扫任务退出");
                        break;
                    }
                }
            }
        });

        Self {
            cache,
            keys,
            namespace,
            ttl,
            shutdown,
        }
    }

    /// 按主键读取
    pub async fn get_by_id(&self, id: &str) -> Option<T> {
        let key = self.keys.entity_id_key(self.namespace, id);
        self.cache.get(&key).await
    }

    /// 按二级键读取
    pub async fn get_by_secondary(&self, field: &str, value: &str) -> Option<T> {
        let key = self.keys.entity_secondary_key(self.namespace, field, value);
        self.cache.get(&key).await
    }

    /// 写入主键条目
    pub async fn put(&self, id: &str, value: T) {
        let key = self.keys.entity_id_key(self.namespace, id);
        self.cache.set(key, value, self.ttl).await;
    }

    /// 写入二级键条目
    pub async fn put_secondary(&self, field: &str, field_value: &str, value: T) {
        let key = self.keys.entity_secondary_key(self.namespace, field, field_value);
        self.cache.set(key, value, self.ttl).await;
    }

    /// 失效主键条目
    pub async fn evict_id(&self, id: &str) -> bool {
        let key = self.keys.entity_id_key(self.namespace, id);
        self.cache.remove(&key).await
    }

    /// 失效二级键条目
    pub async fn evict_secondary(&self, field: &str, field_value: &str) -> bool {
        let key = self.keys.entity_secondary_key(self.namespace, field, field_value);
        self.cache.remove(&key).await
    }

    /// 清空本实体的全部缓存
    pub async fn clear(&self) {
        self.cache.clear().await;
    }

    pub async fn len(&self) -> usize {
        self.cache.len().await
    }

    pub async fn stats(&self) -> LocalCacheStats {
        self.cache.stats().await
    }

    /// 停止周期清扫任务
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}
