//! 边界条件和异常场景测试
//!
//! 确保缓存系统在各种极端情况下的稳定性

#[cfg(test)]
mod edge_case_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::super::{TieredCache, TieredCacheConfig};

    async fn local_only(config_mutator: impl FnOnce(&mut TieredCacheConfig)) -> TieredCache {
        let mut config = TieredCacheConfig {
            redis_url: None,
            ..TieredCacheConfig::default()
        };
        config_mutator(&mut config);
        TieredCache::new(config).await
    }

    #[tokio::test]
    async fn zero_capacity_local_tier() {
        let cache = local_only(|c| c.max_local_entries = 0).await;

        // 零容量本地层不存任何数据，读取稳定返回缺失
        cache.set("key", &"value".to_string(), None).await;
        let fetched: Option<String> = cache.get("key").await;
        assert!(fetched.is_none(), "零容量缓存不应存储数据");
        assert_eq!(cache.local_len().await, 0);
        cache.close();
    }

    #[tokio::test]
    async fn single_capacity_evicts_previous() {
        let cache = local_only(|c| c.max_local_entries = 1).await;

        cache.set("key1", &1u32, None).await;
        cache.set("key2", &2u32, None).await;

        let first: Option<u32> = cache.get("key1").await;
        let second: Option<u32> = cache.get("key2").await;
        assert!(first.is_none(), "先写入的值应被淘汰");
        assert_eq!(second, Some(2));
        cache.close();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_expires_after_any_elapse() {
        let cache = local_only(|_| {}).await;

        cache.set("zero", &1u32, Some(Duration::ZERO)).await;
        // 写入瞬间仍在存活窗口内（存活条件含等号）
        let immediate: Option<u32> = cache.get("zero").await;
        assert_eq!(immediate, Some(1));

        tokio::time::advance(Duration::from_millis(1)).await;
        let later: Option<u32> = cache.get("zero").await;
        assert!(later.is_none(), "任何时间流逝后零TTL条目都应过期");
        cache.close();
    }

    #[tokio::test]
    async fn extreme_long_ttl_stays_alive() {
        let cache = local_only(|_| {}).await;

        let extreme_ttl = Duration::from_secs(u64::MAX / 1000); // 避免溢出
        cache.set("long", &1u32, Some(extreme_ttl)).await;
        let fetched: Option<u32> = cache.get("long").await;
        assert_eq!(fetched, Some(1));
        cache.close();
    }

    #[tokio::test]
    async fn empty_key_and_empty_value() {
        let cache = local_only(|_| {}).await;

        cache.set("", &String::new(), None).await;
        let fetched: Option<String> = cache.get("").await;
        assert_eq!(fetched, Some(String::new()), "空键空值也应能正常存取");
        cache.close();
    }

    #[tokio::test]
    async fn unicode_keys_and_values() {
        let cache = local_only(|_| {}).await;

        cache.set("模板:发票", &"中文值🚀".to_string(), None).await;
        let fetched: Option<String> = cache.get("模板:发票").await;
        assert_eq!(fetched, Some("中文值🚀".to_string()));
        cache.close();
    }

    #[tokio::test]
    async fn type_mismatch_read_counts_as_miss() {
        let cache = local_only(|_| {}).await;

        cache.set("typed", &"一段文字".to_string(), None).await;
        // 以错误类型读取：解码失败按缺失处理，不得panic
        let fetched: Option<u64> = cache.get("typed").await;
        assert!(fetched.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.errors, 1, "解码失败应计入错误");
        cache.close();
    }

    #[tokio::test]
    async fn concurrent_writers_respect_bound() {
        let cache = Arc::new(local_only(|c| c.max_local_entries = 50).await);

        let mut handles = Vec::new();
        for worker in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    let key = format!("w{}:{}", worker, i);
                    cache.set(&key, &i, None).await;
                    let _: Option<i32> = cache.get(&key).await;
                }
            }));
        }
        for handle in handles {
            handle.await.expect("并发任务不应panic");
        }

        assert!(cache.local_len().await <= 50, "并发写入下容量上界仍须有效");
        cache.close();
    }

    #[tokio::test]
    async fn overwrite_changes_value_in_place() {
        let cache = local_only(|_| {}).await;

        cache.set("key", &1u32, None).await;
        cache.set("key", &2u32, None).await;

        let fetched: Option<u32> = cache.get("key").await;
        assert_eq!(fetched, Some(2));
        assert_eq!(cache.local_len().await, 1);
        cache.close();
    }
}
