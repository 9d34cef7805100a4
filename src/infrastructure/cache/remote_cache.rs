//! 远端缓存实现（共享层）
//!
//! 基于Redis协议的键值服务封装，跨实例共享、进程重启后仍然有效。
//! 本模块只做传输和编解码，所有错误以类型化结果返回；
//! 降级到本地层的决策统一由TieredCache的策略函数处理。

use std::time::Duration;

use tracing::debug;

use super::{CacheError, StoredEntry, WirePayload};

/// 远端缓存客户端封装
#[derive(Debug, Clone)]
pub struct RemoteCache {
    client: redis::Client,
    default_ttl: Duration,
}

impl RemoteCache {
    /// 创建新的远端缓存实例（惰性连接，真正的网络交互发生在首次命令时）
    pub fn new(redis_url: &str, default_ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            default_ttl,
        })
    }

    /// 测试连接
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.get_connection().await?;
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// 获取连接
    async fn get_connection(&self) -> Result<redis::aio::Connection, CacheError> {
        Ok(self.client.get_async_connection().await?)
    }

    /// 获取缓存条目
    pub async fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let mut conn = self.get_connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        match raw {
            Some(value) => {
                let wire: WirePayload = serde_json::from_str(&value)?;
                debug!("远端缓存命中: key={}", key);
                Ok(Some(wire.into_entry()?))
            }
            None => {
                debug!("远端缓存未命中: key={}", key);
                Ok(None)
            }
        }
    }

    /// 写入缓存条目，TTL以毫秒精度下发
    pub async fn set(
        &self,
        key: &str,
        entry: &StoredEntry,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let serialized = serde_json::to_string(&WirePayload::from_entry(entry))?;

        let mut conn = self.get_connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(&serialized)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!("远端缓存写入: key={}, ttl={:?}", key, ttl);
        Ok(())
    }

    /// 删除缓存条目，返回键是否存在
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.get_connection().await?;
        let deleted: i32 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(deleted > 0)
    }

    /// 按glob模式批量删除，返回删除数量
    pub async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut conn = self.get_connection().await?;

        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let deleted: i32 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
        debug!("远端缓存模式删除: pattern={}, deleted={}", pattern, deleted);
        Ok(deleted as usize)
    }

    /// 批量读取
    pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<StoredEntry>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.get_connection().await?;
        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;

        let mut entries = Vec::with_capacity(raw.len());
        for value in raw {
            match value {
                Some(text) => {
                    // 单条解码失败按缺失处理，不拖垮整个批次
                    let entry = serde_json::from_str::<WirePayload>(&text)
                        .ok()
                        .and_then(|wire| wire.into_entry().ok());
                    entries.push(entry);
                }
                None => entries.push(None),
            }
        }
        Ok(entries)
    }

    /// 批量写入（流水线一次往返）
    pub async fn mset(
        &self,
        entries: &[(String, StoredEntry)],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }

        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut pipe = redis::pipe();
        for (key, entry) in entries {
            let serialized = serde_json::to_string(&WirePayload::from_entry(entry))?;
            pipe.cmd("SET")
                .arg(key)
                .arg(serialized)
                .arg("PX")
                .arg(ttl.as_millis() as u64)
                .ignore();
        }

        let mut conn = self.get_connection().await?;
        pipe.query_async::<_, ()>(&mut conn).await?;

        debug!("远端缓存批量写入: count={}, ttl={:?}", entries.len(), ttl);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    #[ignore] // 需要Redis实例才能运行
    async fn remote_cache_roundtrip() {
        let cache = RemoteCache::new("redis://localhost:6379", Duration::from_secs(300))
            .expect("创建远端缓存失败");

        cache.ping().await.expect("PING失败");

        let entry = StoredEntry {
            data: Bytes::from(serde_json::to_vec("test_value").unwrap()),
            compressed: false,
        };

        cache
            .set("test:remote:key", &entry, None)
            .await
            .expect("写入失败");

        let fetched = cache.get("test:remote:key").await.expect("读取失败");
        assert_eq!(fetched.expect("应命中").data, entry.data);

        assert!(cache.delete("test:remote:key").await.expect("删除失败"));
        assert!(cache.get("test:remote:key").await.expect("读取失败").is_none());
    }
}
