//! 缓存基础设施模块
//!
//! 实现双层缓存策略：
//! - 远端层: 共享键值服务（可选，不可达时静默降级）
//! - 本地层: 进程内有界缓存，按插入顺序淘汰
//!
//! 远端层故障永远不会上抛给调用方，降级统一发生在TieredCache的
//! 策略函数里，传输层只负责返回带类型的错误。

use std::io::{Read, Write};
use std::time::Duration;

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub mod local_cache;
pub mod remote_cache;
pub mod tiered_cache;

pub mod integration_test;
pub mod invalidation_test;
pub mod edge_case_tests;

// 重新导出主要类型
pub use local_cache::{LocalCache, LocalCacheStats, SharedLocalCache};
pub use remote_cache::RemoteCache;
pub use tiered_cache::{CacheHealth, TieredCache};

/// 缓存传输/编解码层错误
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// 远端缓存传输错误（连接失败、超时、命令失败）
    #[error("远端缓存错误: {0}")]
    Transport(#[from] redis::RedisError),

    /// 序列化/反序列化失败
    #[error("缓存序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 压缩/解压失败
    #[error("缓存压缩失败: {0}")]
    Compression(#[from] std::io::Error),

    /// 载荷编码失败
    #[error("缓存载荷编码失败: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// 值超过大小硬上限
    #[error("缓存值过大: {size} 字节，上限 {limit} 字节")]
    PayloadTooLarge { size: usize, limit: usize },
}

/// 缓存值包装器，记录写入时间与TTL
///
/// 过期判定：now - created_at > ttl 视为缺失，下次访问时清除。
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
    pub value: T,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl<T> CachedValue<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now().duration_since(self.created_at) > self.ttl
    }

    pub fn remaining_ttl(&self) -> Option<Duration> {
        let elapsed = Instant::now().duration_since(self.created_at);
        if elapsed > self.ttl {
            None
        } else {
            Some(self.ttl - elapsed)
        }
    }
}

/// 序列化后的缓存条目（两级缓存共用的存储形态）
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// 序列化（可能已压缩）后的载荷
    pub data: Bytes,
    /// 载荷是否经过gzip压缩
    pub compressed: bool,
}

/// 远端层的传输信封
///
/// 远端缓存以字符串存值，二进制载荷经base64转运。
#[derive(Debug, Serialize, Deserialize)]
pub struct WirePayload {
    /// 载荷是否压缩
    pub c: bool,
    /// base64编码的载荷
    pub d: String,
}

impl WirePayload {
    /// 由存储条目构造传输信封
    pub fn from_entry(entry: &StoredEntry) -> Self {
        Self {
            c: entry.compressed,
            d: base64::engine::general_purpose::STANDARD.encode(&entry.data),
        }
    }

    /// 还原为存储条目
    pub fn into_entry(self) -> Result<StoredEntry, CacheError> {
        let data = base64::engine::general_purpose::STANDARD.decode(self.d)?;
        Ok(StoredEntry {
            data: Bytes::from(data),
            compressed: self.c,
        })
    }
}

/// gzip压缩
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// gzip解压
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// 分层缓存配置
#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    /// 远端连接串，None表示仅本地缓存
    pub redis_url: Option<String>,
    /// 默认TTL
    pub default_ttl: Duration,
    /// 本地缓存容量上限
    pub max_local_entries: usize,
    /// 超过该序列化大小启用压缩
    pub compression_threshold: usize,
    /// 单值大小硬上限，超出的set被拒绝
    pub max_payload_bytes: usize,
    /// 后台过期清扫间隔
    pub sweep_interval: Duration,
    /// 远端PING超时
    pub ping_timeout: Duration,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        use crate::shared::constants::cache;
        Self {
            redis_url: None,
            default_ttl: Duration::from_millis(cache::DEFAULT_TTL_MS),
            max_local_entries: cache::MAX_LOCAL_ENTRIES,
            compression_threshold: cache::COMPRESSION_THRESHOLD_BYTES,
            max_payload_bytes: cache::MAX_PAYLOAD_BYTES,
            sweep_interval: Duration::from_millis(cache::SWEEP_INTERVAL_MS),
            ping_timeout: Duration::from_millis(cache::REMOTE_PING_TIMEOUT_MS),
        }
    }
}

impl TieredCacheConfig {
    /// 由全局配置构造
    pub fn from_settings(settings: &crate::infrastructure::config::CacheSettings) -> Self {
        Self {
            redis_url: settings.redis_url.clone(),
            default_ttl: Duration::from_millis(settings.default_ttl_ms),
            max_local_entries: settings.max_local_entries,
            compression_threshold: settings.compression_threshold_bytes,
            max_payload_bytes: settings.max_payload_bytes,
            sweep_interval: Duration::from_millis(settings.sweep_interval_ms),
            ping_timeout: Duration::from_millis(
                crate::shared::constants::cache::REMOTE_PING_TIMEOUT_MS,
            ),
        }
    }
}

/// 缓存运行统计
///
/// 进程生命周期内单调累积，可按需重置。hit_rate为派生值。
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    /// 远端失败后落到本地层的次数
    pub local_fallbacks: u64,
    /// 操作响应时间的指数移动平均（毫秒）
    pub avg_response_time_ms: f64,
}

impl CacheStats {
    /// 命中率
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }

    /// 更新响应时间移动平均
    pub fn observe_response_time(&mut self, elapsed_ms: f64) {
        let alpha = crate::shared::constants::cache::RESPONSE_TIME_EMA_ALPHA;
        if self.avg_response_time_ms == 0.0 {
            self.avg_response_time_ms = elapsed_ms;
        } else {
            self.avg_response_time_ms = alpha * elapsed_ms + (1.0 - alpha) * self.avg_response_time_ms;
        }
    }

    /// 重置所有计数
    pub fn reset(&mut self) {
        *self = CacheStats::default();
    }
}

/// 缓存键构建器
///
/// 统一拼装命名空间化的键，保证不同实体/字段的短键互不碰撞。
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    prefix: String,
}

impl CacheKeyBuilder {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// 实体主键缓存键
    pub fn entity_id_key(&self, namespace: &str, id: &str) -> String {
        format!("{}{}:id:{}", self.prefix, namespace, id)
    }

    /// 实体二级键缓存键（email、slug等）
    pub fn entity_secondary_key(&self, namespace: &str, field: &str, value: &str) -> String {
        format!("{}{}:{}:{}", self.prefix, namespace, field, value)
    }

    /// 实体命名空间的整体失效模式
    pub fn entity_pattern(&self, namespace: &str) -> String {
        format!("{}{}:*", self.prefix, namespace)
    }

    /// 搜索结果缓存键（条件指纹 + 时间范围）
    pub fn search_key(&self, fingerprint: &str, timeframe: &str) -> String {
        format!("{}search:{}:{}", self.prefix, fingerprint, timeframe)
    }

    /// 搜索缓存的整体失效模式
    pub fn search_pattern(&self) -> String {
        format!("{}search:*", self.prefix)
    }

    /// 热门列表缓存键
    pub fn popular_key(&self, timeframe: &str, limit: usize) -> String {
        format!("{}popular:{}:{}", self.prefix, timeframe, limit)
    }

    /// 热门列表的整体失效模式
    pub fn popular_pattern(&self) -> String {
        format!("{}popular:*", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_value_remaining_ttl() {
        let v = CachedValue::new(1u32, Duration::from_secs(60));
        assert!(!v.is_expired());
        assert!(v.remaining_ttl().is_some());
    }

    #[test]
    fn wire_payload_roundtrip() {
        let entry = StoredEntry {
            data: Bytes::from(vec![1u8, 2, 3, 255]),
            compressed: true,
        };
        let wire = WirePayload::from_entry(&entry);
        let back = wire.into_entry().expect("解码应成功");
        assert_eq!(back.data, entry.data);
        assert!(back.compressed);
    }

    #[test]
    fn compress_roundtrip() {
        let data = "模板正文".repeat(200);
        let compressed = compress(data.as_bytes()).expect("压缩应成功");
        assert!(compressed.len() < data.len());
        let restored = decompress(&compressed).expect("解压应成功");
        assert_eq!(restored, data.as_bytes());
    }

    #[test]
    fn key_builder_namespacing() {
        let keys = CacheKeyBuilder::new("hub:");
        assert_eq!(keys.entity_id_key("user", "42"), "hub:user:id:42");
        assert_eq!(
            keys.entity_secondary_key("user", "email", "a@b.com"),
            "hub:user:email:a@b.com"
        );
        // 相同的短值在不同实体/字段下生成不同的键
        assert_ne!(
            keys.entity_secondary_key("user", "email", "x"),
            keys.entity_secondary_key("template", "slug", "x")
        );
        assert_eq!(keys.search_pattern(), "hub:search:*");
    }

    #[test]
    fn cache_stats_hit_rate_and_reset() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.hits = 3;
        stats.misses = 1;
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);

        stats.observe_response_time(10.0);
        assert!(stats.avg_response_time_ms > 0.0);

        stats.reset();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.avg_response_time_ms, 0.0);
    }
}
