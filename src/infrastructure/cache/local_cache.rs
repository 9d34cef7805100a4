//! 本地缓存实现（进程内层）
//!
//! 有界映射，满容量时按插入顺序淘汰最老条目。
//! 只保证内存上界单调有效，不追求严格LRU的访问序维护。

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::CachedValue;
use crate::shared::utils::glob_match;

/// 本地缓存统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalCacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// 因TTL过期被清除的条目数（读触发与后台清扫合计）
    pub expired_purged: u64,
}

/// 有界本地缓存
#[derive(Debug)]
pub struct LocalCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    entries: HashMap<K, CachedValue<V>>,
    /// 插入顺序队列；删除操作留下的陈旧键在淘汰时跳过
    insertion_order: VecDeque<K>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expired_purged: u64,
}

impl<K, V> LocalCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            insertion_order: VecDeque::with_capacity(capacity),
            capacity,
            hits: 0,
            misses: 0,
            evictions: 0,
            expired_purged: 0,
        }
    }

    /// 获取缓存值；过期条目当场清除并按未命中处理
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(cached) if !cached.is_expired() => {
                self.hits += 1;
                Some(cached.value.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                self.expired_purged += 1;
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// 写入缓存值
    ///
    /// 已存在的键原地更新，保留最初的插入位置；
    /// 新键在满容量时先按插入顺序淘汰最老条目。
    pub fn set(&mut self, key: K, value: V, ttl: Duration) {
        if self.capacity == 0 {
            return;
        }

        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = CachedValue::new(value, ttl);
            return;
        }

        while self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        self.insertion_order.push_back(key.clone());
        self.entries.insert(key, CachedValue::new(value, ttl));
    }

    /// 移除指定键
    pub fn remove(&mut self, key: &K) -> bool {
        // 插入顺序队列中的残留键由淘汰循环跳过，不在此处线性扫描
        self.entries.remove(key).is_some()
    }

    /// 清空缓存
    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 收集当前已过期的键（供批量清扫使用，不修改状态）
    pub fn collect_expired(&self) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, cached)| cached.is_expired())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// 复核后移除过期键；键已被重写为新值时不动
    pub fn remove_if_expired(&mut self, key: &K) -> bool {
        let expired = matches!(self.entries.get(key), Some(cached) if cached.is_expired());
        if expired {
            self.entries.remove(key);
            self.expired_purged += 1;
        }
        expired
    }

    /// 获取统计信息
    pub fn stats(&self) -> LocalCacheStats {
        LocalCacheStats {
            size: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expired_purged: self.expired_purged,
        }
    }

    /// 按插入顺序淘汰一个仍存活的最老条目
    fn evict_oldest(&mut self) {
        while let Some(oldest) = self.insertion_order.pop_front() {
            if self.entries.remove(&oldest).is_some() {
                self.evictions += 1;
                return;
            }
            // 陈旧队列项（已被remove），继续向后找
        }
    }
}

impl<V> LocalCache<String, V>
where
    V: Clone,
{
    /// 返回匹配glob模式的全部键
    pub fn keys_matching(&self, pattern: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect()
    }
}

/// 线程安全的本地缓存包装器
#[derive(Debug)]
pub struct SharedLocalCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    inner: Arc<RwLock<LocalCache<K, V>>>,
}

impl<K, V> Clone for SharedLocalCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> SharedLocalCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LocalCache::new(capacity))),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.write().await;
        cache.get(key)
    }

    pub async fn set(&self, key: K, value: V, ttl: Duration) {
        let mut cache = self.inner.write().await;
        cache.set(key, value, ttl)
    }

    pub async fn remove(&self, key: &K) -> bool {
        let mut cache = self.inner.write().await;
        cache.remove(key)
    }

    pub async fn clear(&self) {
        let mut cache = self.inner.write().await;
        cache.clear()
    }

    pub async fn len(&self) -> usize {
        let cache = self.inner.read().await;
        cache.len()
    }

    pub async fn stats(&self) -> LocalCacheStats {
        let cache = self.inner.read().await;
        cache.stats()
    }

    /// 批量清扫过期条目
    ///
    /// 先在读锁下收集过期键，再分小批在写锁下复核删除，
    /// 避免大缓存整个清扫期间持锁阻塞并发请求。
    pub async fn purge_expired(&self) -> usize {
        let expired = {
            let cache = self.inner.read().await;
            cache.collect_expired()
        };

        if expired.is_empty() {
            return 0;
        }

        let mut removed = 0;
        for batch in expired.chunks(64) {
            let mut cache = self.inner.write().await;
            for key in batch {
                if cache.remove_if_expired(key) {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            debug!("本地缓存清扫完成: removed={}", removed);
        }
        removed
    }
}

impl<V> SharedLocalCache<String, V>
where
    V: Clone + Send + Sync,
{
    /// 删除所有匹配glob模式的键，返回删除数量
    pub async fn remove_matching(&self, pattern: &str) -> usize {
        let mut cache = self.inner.write().await;
        let keys = cache.keys_matching(pattern);
        let mut removed = 0;
        for key in &keys {
            if cache.remove(key) {
                removed += 1;
            }
        }
        removed
    }
}
