//! 缓存失效测试
//!
//! 验证精确删除与glob模式失效的边界：
//! 匹配的键一个不剩，不匹配的键一个不动，远端缺席不影响本地失效。

#[cfg(test)]
mod invalidation_tests {
    use super::super::{TieredCache, TieredCacheConfig};

    async fn local_only() -> TieredCache {
        TieredCache::new(TieredCacheConfig {
            redis_url: None,
            ..TieredCacheConfig::default()
        })
        .await
    }

    async fn seed(cache: &TieredCache, keys: &[&str]) {
        for key in keys {
            cache.set(key, &"v".to_string(), None).await;
        }
    }

    #[tokio::test]
    async fn prefix_pattern_removes_only_matching_keys() {
        let cache = local_only().await;
        seed(
            &cache,
            &[
                "template:id:1",
                "template:id:2",
                "template:slug:invoice",
                "user:id:1",
                "category:id:1",
            ],
        )
        .await;

        let removed = cache.invalidate_pattern("template:*").await;
        assert_eq!(removed, 3);

        // 匹配前缀的键全部消失
        let gone: Option<String> = cache.get("template:id:1").await;
        assert!(gone.is_none());
        let gone: Option<String> = cache.get("template:slug:invoice").await;
        assert!(gone.is_none());

        // 其它命名空间原样保留
        let kept: Option<String> = cache.get("user:id:1").await;
        assert!(kept.is_some());
        let kept: Option<String> = cache.get("category:id:1").await;
        assert!(kept.is_some());
        cache.close();
    }

    #[tokio::test]
    async fn infix_pattern_matches_middle_segment() {
        let cache = local_only().await;
        seed(
            &cache,
            &["search:abc:week", "search:def:week", "search:abc:month"],
        )
        .await;

        let removed = cache.invalidate_pattern("search:*:week").await;
        assert_eq!(removed, 2);

        let kept: Option<String> = cache.get("search:abc:month").await;
        assert!(kept.is_some(), "不同时间范围的键不得被波及");
        cache.close();
    }

    #[tokio::test]
    async fn pattern_with_no_match_is_noop() {
        let cache = local_only().await;
        seed(&cache, &["user:id:1"]).await;

        assert_eq!(cache.invalidate_pattern("absent:*").await, 0);
        let kept: Option<String> = cache.get("user:id:1").await;
        assert!(kept.is_some());
        cache.close();
    }

    #[tokio::test]
    async fn invalidation_works_without_remote_tier() {
        // 远端层未配置（等价于故障缺席）时本地失效照常生效
        let cache = local_only().await;
        seed(&cache, &["template:id:1", "template:id:2"]).await;

        let removed = cache.invalidate_pattern("template:*").await;
        assert_eq!(removed, 2);
        assert_eq!(cache.local_len().await, 0);
        cache.close();
    }

    #[tokio::test]
    async fn delete_then_pattern_counts_stay_consistent() {
        let cache = local_only().await;
        seed(&cache, &["template:id:1", "template:id:2"]).await;

        assert!(cache.delete("template:id:1").await);
        let removed = cache.invalidate_pattern("template:*").await;
        assert_eq!(removed, 1, "已删除的键不应被重复统计");
        cache.close();
    }
}
