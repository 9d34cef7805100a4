//! 分层缓存管理器
//!
//! 统一管理双层缓存：远端共享层优先，进程内本地层兜底。
//! 远端层任何故障都在这里降级消化，调用方永远拿不到缓存错误；
//! 缓存不可用最多让请求变慢，绝不能让请求失败。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use super::{
    compress, decompress, CacheError, CacheStats, LocalCacheStats, RemoteCache,
    SharedLocalCache, StoredEntry, TieredCacheConfig,
};
use crate::shared::utils::format_bytes;

/// 缓存健康状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    /// 是否配置了远端层
    pub remote_configured: bool,
    /// 远端层实时PING是否成功（未配置时为false）
    pub remote_healthy: bool,
    /// 本地层是否未满
    pub local_healthy: bool,
    pub local_stats: LocalCacheStats,
    pub stats: CacheStats,
}

/// 分层缓存管理器
#[derive(Debug, Clone)]
pub struct TieredCache {
    config: TieredCacheConfig,
    local: SharedLocalCache<String, StoredEntry>,
    remote: Option<RemoteCache>,
    /// 远端层当前是否可用；故障后由后台任务按自己的节奏重探，
    /// 不在请求路径上反复重连
    remote_available: Arc<AtomicBool>,
    stats: Arc<RwLock<CacheStats>>,
    shutdown: watch::Sender<bool>,
}

impl TieredCache {
    /// 创建分层缓存并启动后台清扫任务
    pub async fn new(config: TieredCacheConfig) -> Self {
        let local = SharedLocalCache::new(config.max_local_entries);

        let remote = match config.redis_url.as_deref() {
            Some(url) => match RemoteCache::new(url, config.default_ttl) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!("远端缓存初始化失败，退化为仅本地缓存: {}", e);
                    None
                }
            },
            None => {
                debug!("未配置远端缓存，仅使用本地缓存");
                None
            }
        };

        let remote_available = Arc::new(AtomicBool::new(false));
        if let Some(ref cache) = remote {
            match tokio::time::timeout(config.ping_timeout, cache.ping()).await {
                Ok(Ok(())) => {
                    remote_available.store(true, Ordering::Relaxed);
                    info!("✅ 远端缓存连接成功");
                }
                Ok(Err(e)) => warn!("⚠️ 远端缓存暂不可用，启用本地降级: {}", e),
                Err(_) => warn!("⚠️ 远端缓存PING超时，启用本地降级"),
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);

        let cache = Self {
            config,
            local,
            remote,
            remote_available,
            stats: Arc::new(RwLock::new(CacheStats::default())),
            shutdown,
        };

        cache.spawn_sweeper(shutdown_rx);
        cache
    }

    /// 获取缓存值
    ///
    /// 远端层优先；远端未命中或不可用时查本地层。
    /// 每次调用恰好记一次命中或未命中，并更新响应时间移动平均。
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let start = std::time::Instant::now();
        let result = self.get_entry(key).await;

        let decoded = match result {
            Some(entry) => match decode_value(&entry) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("缓存值解码失败: key={}, error={}", key, e);
                    self.record_error().await;
                    None
                }
            },
            None => None,
        };

        let mut stats = self.stats.write().await;
        if decoded.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        stats.observe_response_time(start.elapsed().as_secs_f64() * 1000.0);

        decoded
    }

    /// 写入缓存值
    ///
    /// 超过大小硬上限的值被拒绝（返回false，不抛错）。
    /// 远端层写入失败时本地层兜底，调用仍然成功。
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let ttl = ttl.unwrap_or(self.config.default_ttl);

        let entry = match self.encode_value(value) {
            Ok(Some(entry)) => entry,
            Ok(None) => return false, // 超限拒绝
            Err(e) => {
                warn!("缓存值编码失败: key={}, error={}", key, e);
                self.record_error().await;
                return false;
            }
        };

        // 本地层总是写入，远端失联期间它就是第一现场
        self.local.set(key.to_string(), entry.clone(), ttl).await;

        if let Some(remote) = self.remote_if_available() {
            if let Err(e) = remote.set(key, &entry, Some(ttl)).await {
                self.degrade_remote("set", key, &e).await;
            }
        }

        self.stats.write().await.sets += 1;
        true
    }

    /// 删除缓存值（两层尽力删除），返回键是否存在于任一层
    pub async fn delete(&self, key: &str) -> bool {
        let local_removed = self.local.remove(&key.to_string()).await;

        let mut remote_removed = false;
        if let Some(remote) = self.remote_if_available() {
            match remote.delete(key).await {
                Ok(removed) => remote_removed = removed,
                Err(e) => self.degrade_remote("delete", key, &e).await,
            }
        }

        self.stats.write().await.deletes += 1;
        local_removed || remote_removed
    }

    /// 按glob模式失效两层缓存，返回失效条目数
    ///
    /// 远端层不可用时本地层照常失效。
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let local_removed = self.local.remove_matching(pattern).await;

        let mut remote_removed = 0;
        if let Some(remote) = self.remote_if_available() {
            match remote.delete_pattern(pattern).await {
                Ok(count) => remote_removed = count,
                Err(e) => self.degrade_remote("invalidate_pattern", pattern, &e).await,
            }
        }

        let removed = local_removed.max(remote_removed);
        if removed > 0 {
            info!("缓存模式失效: pattern={}, removed={}", pattern, removed);
        }
        removed
    }

    /// 批量读取
    ///
    /// 远端批量请求失败不影响本地层兜底，已解析的值照常返回。
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        if keys.is_empty() {
            return Vec::new();
        }

        let remote_entries = match self.remote_if_available() {
            Some(remote) => match remote.mget(keys).await {
                Ok(entries) => entries,
                Err(e) => {
                    self.degrade_remote("mget", "<batch>", &e).await;
                    vec![None; keys.len()]
                }
            },
            None => vec![None; keys.len()],
        };

        let mut results = Vec::with_capacity(keys.len());
        let mut hits = 0u64;
        let mut misses = 0u64;

        for (key, remote_entry) in keys.iter().zip(remote_entries) {
            let entry = match remote_entry {
                Some(entry) => Some(entry),
                None => self.local.get(key).await,
            };

            let decoded: Option<T> = entry.as_ref().and_then(|e| decode_value(e).ok());
            if decoded.is_some() {
                hits += 1;
            } else {
                misses += 1;
            }
            results.push(decoded);
        }

        let mut stats = self.stats.write().await;
        stats.hits += hits;
        stats.misses += misses;

        results
    }

    /// 批量写入
    ///
    /// 远端流水线失败时已完成的本地写入全部保留。
    pub async fn mset<T: Serialize>(&self, entries: &[(String, T)], ttl: Option<Duration>) -> usize {
        let ttl = ttl.unwrap_or(self.config.default_ttl);

        let mut encoded: Vec<(String, StoredEntry)> = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match self.encode_value(value) {
                Ok(Some(entry)) => encoded.push((key.clone(), entry)),
                Ok(None) => continue, // 超限条目跳过，不影响批次其余部分
                Err(e) => {
                    warn!("批量写入编码失败: key={}, error={}", key, e);
                    self.record_error().await;
                }
            }
        }

        for (key, entry) in &encoded {
            self.local.set(key.clone(), entry.clone(), ttl).await;
        }

        if let Some(remote) = self.remote_if_available() {
            if let Err(e) = remote.mset(&encoded, Some(ttl)).await {
                self.degrade_remote("mset", "<batch>", &e).await;
            }
        }

        self.stats.write().await.sets += encoded.len() as u64;
        encoded.len()
    }

    /// 健康检查：远端实时PING（独立超时），本地层按容量判定
    pub async fn health_check(&self) -> CacheHealth {
        let remote_healthy = match &self.remote {
            Some(remote) => {
                match tokio::time::timeout(self.config.ping_timeout, remote.ping()).await {
                    Ok(Ok(())) => {
                        self.remote_available.store(true, Ordering::Relaxed);
                        true
                    }
                    _ => {
                        self.remote_available.store(false, Ordering::Relaxed);
                        false
                    }
                }
            }
            None => false,
        };

        let local_stats = self.local.stats().await;
        CacheHealth {
            remote_configured: self.remote.is_some(),
            remote_healthy,
            local_healthy: local_stats.size < self.config.max_local_entries,
            local_stats,
            stats: self.stats.read().await.clone(),
        }
    }

    /// 获取运行统计
    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    /// 重置运行统计
    pub async fn reset_stats(&self) {
        self.stats.write().await.reset();
    }

    /// 本地层当前条目数
    pub async fn local_len(&self) -> usize {
        self.local.len().await
    }

    /// 停止后台清扫任务
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
        debug!("分层缓存后台任务已通知关闭");
    }

    // ------------------------------------------------------------------
    // 内部实现
    // ------------------------------------------------------------------

    /// 读取存储条目：远端优先，远端未命中或不可用时读本地
    async fn get_entry(&self, key: &str) -> Option<StoredEntry> {
        if let Some(remote) = self.remote_if_available() {
            match remote.get(key).await {
                Ok(Some(entry)) => return Some(entry),
                Ok(None) => {}
                Err(e) => self.degrade_remote("get", key, &e).await,
            }
        }

        self.local.get(&key.to_string()).await
    }

    /// 序列化并按阈值压缩；超过硬上限返回None表示拒绝
    fn encode_value<T: Serialize>(&self, value: &T) -> Result<Option<StoredEntry>, CacheError> {
        let serialized = serde_json::to_vec(value)?;

        if serialized.len() > self.config.max_payload_bytes {
            warn!(
                "缓存值超过大小上限被拒绝: size={}, limit={}",
                format_bytes(serialized.len() as u64),
                format_bytes(self.config.max_payload_bytes as u64)
            );
            return Ok(None);
        }

        if serialized.len() > self.config.compression_threshold {
            let compressed = compress(&serialized)?;
            debug!(
                "缓存值已压缩: {} -> {}",
                format_bytes(serialized.len() as u64),
                format_bytes(compressed.len() as u64)
            );
            return Ok(Some(StoredEntry {
                data: compressed.into(),
                compressed: true,
            }));
        }

        Ok(Some(StoredEntry {
            data: serialized.into(),
            compressed: false,
        }))
    }

    /// 远端降级策略的唯一入口：记错误、标记不可用、交还本地层
    async fn degrade_remote(&self, op: &str, key: &str, error: &CacheError) {
        warn!("远端缓存{}失败，降级到本地层: key={}, error={}", op, key, error);
        self.remote_available.store(false, Ordering::Relaxed);

        let mut stats = self.stats.write().await;
        stats.errors += 1;
        stats.local_fallbacks += 1;
    }

    async fn record_error(&self) {
        self.stats.write().await.errors += 1;
    }

    fn remote_if_available(&self) -> Option<&RemoteCache> {
        if self.remote_available.load(Ordering::Relaxed) {
            self.remote.as_ref()
        } else {
            None
        }
    }

    /// 启动后台清扫任务
    ///
    /// 周期性清除本地层的TTL过期条目（与读触发淘汰互为补充，
    /// 防止只写不读的键泄漏内存），并顺带重探失联的远端层。
    fn spawn_sweeper(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let local = self.local.clone();
        let remote = self.remote.clone();
        let remote_available = Arc::clone(&self.remote_available);
        let interval = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // 第一次tick立即返回，跳过它让节奏从一个完整周期开始
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = local.purge_expired().await;
                        if removed > 0 {
                            debug!("🧹 后台清扫移除过期条目: {}", removed);
                        }

                        // 远端失联时在这里重探，而不是在请求路径上
                        if let Some(ref remote) = remote {
                            if !remote_available.load(Ordering::Relaxed)
                                && remote.ping().await.is_ok()
                            {
                                remote_available.store(true, Ordering::Relaxed);
                                info!("✅ 远端缓存恢复可用");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("后台清扫任务退出");
                        break;
                    }
                }
            }
        });
    }
}

/// 解压并反序列化存储条目
fn decode_value<T: DeserializeOwned>(entry: &StoredEntry) -> Result<T, CacheError> {
    if entry.compressed {
        let raw = decompress(&entry.data)?;
        Ok(serde_json::from_slice(&raw)?)
    } else {
        Ok(serde_json::from_slice(&entry.data)?)
    }
}
