//! 分层缓存集成测试
//!
//! 在无远端层的降级形态下走通完整读写路径，
//! 覆盖压缩透明性、统计累积与健康检查。

#[cfg(test)]
mod integration_tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    use super::super::{TieredCache, TieredCacheConfig};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        id: String,
        title: String,
        body: String,
        downloads: u64,
    }

    fn payload(id: &str, body_size: usize) -> Payload {
        Payload {
            id: id.to_string(),
            title: format!("标题-{}", id),
            body: "内容".repeat(body_size),
            downloads: 42,
        }
    }

    async fn local_only(config_mutator: impl FnOnce(&mut TieredCacheConfig)) -> TieredCache {
        let mut config = TieredCacheConfig {
            redis_url: None,
            ..TieredCacheConfig::default()
        };
        config_mutator(&mut config);
        TieredCache::new(config).await
    }

    #[tokio::test]
    async fn structured_value_roundtrip() {
        let cache = local_only(|_| {}).await;

        let value = payload("t1", 10);
        assert!(cache.set("tpl:t1", &value, None).await);

        let fetched: Option<Payload> = cache.get("tpl:t1").await;
        assert_eq!(fetched, Some(value));
        cache.close();
    }

    #[tokio::test]
    async fn compressed_and_uncompressed_interleaved() {
        // 阈值压低，大小值混写，读取必须无差别
        let cache = local_only(|c| c.compression_threshold = 256).await;

        let small = payload("small", 1);
        let large = payload("large", 4096);

        cache.set("tpl:small", &small, None).await;
        cache.set("tpl:large", &large, None).await;

        let fetched_small: Option<Payload> = cache.get("tpl:small").await;
        let fetched_large: Option<Payload> = cache.get("tpl:large").await;
        assert_eq!(fetched_small, Some(small));
        assert_eq!(fetched_large, Some(large));
        cache.close();
    }

    #[tokio::test]
    async fn stats_accumulate_across_operations() {
        let cache = local_only(|_| {}).await;

        cache.set("a", &1u32, None).await;
        cache.set("b", &2u32, None).await;
        let _: Option<u32> = cache.get("a").await;
        let _: Option<u32> = cache.get("missing").await;
        cache.delete("b").await;

        let stats = cache.stats().await;
        assert_eq!(stats.sets, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.deletes, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
        assert!(stats.avg_response_time_ms >= 0.0);

        cache.reset_stats().await;
        let stats = cache.stats().await;
        assert_eq!(stats.hits + stats.misses + stats.sets, 0);
        cache.close();
    }

    #[tokio::test]
    async fn local_bound_holds_under_churn() {
        let cache = local_only(|c| c.max_local_entries = 8).await;

        for i in 0..200 {
            cache.set(&format!("churn:{}", i), &i, None).await;
            assert!(cache.local_len().await <= 8, "本地层大小必须恒有界");
        }
        cache.close();
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_purges_write_only_keys() {
        // 只写不读的键靠后台清扫回收，不等下一次读触发
        let cache = local_only(|c| {
            c.sweep_interval = Duration::from_millis(500);
            c.max_local_entries = 100;
        })
        .await;

        for i in 0..20 {
            cache
                .set(&format!("wo:{}", i), &i, Some(Duration::from_millis(100)))
                .await;
        }
        assert_eq!(cache.local_len().await, 20);

        // 越过TTL并给清扫周期让出时间片
        tokio::time::advance(Duration::from_millis(1100)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(cache.local_len().await, 0, "后台清扫应移除全部过期键");
        cache.close();
    }
}
