//! 服务编排器
//!
//! 整个加速层的显式构造入口：分层缓存、监控、限流与各实体缓存服务
//! 在这里组装成一个可注入的组件，按进程一份实例由调用方持有传递，
//! 不依赖任何隐式全局状态；close()统一停掉全部后台任务。

use std::sync::Arc;

use tracing::info;

use super::category_service::CategoryCacheService;
use super::monitor_service::{HealthStatus, PerformanceMonitor};
use super::rate_limit_service::{RateLimitDimension, RateLimitService, SharedRateLimitService};
use super::template_service::TemplateCacheService;
use super::user_service::UserCacheService;
use crate::infrastructure::cache::{CacheKeyBuilder, TieredCache, TieredCacheConfig};
use crate::infrastructure::config::Config;
use crate::infrastructure::storage::{PgDocumentStore, SharedDocumentStore};
use crate::shared::AppResult;
use std::time::Duration;

/// 服务编排器
pub struct ServiceManager {
    config: Config,
    store: SharedDocumentStore,
    cache: Arc<TieredCache>,
    monitor: Arc<PerformanceMonitor>,
    rate_limiter: SharedRateLimitService,
    users: UserCacheService,
    templates: TemplateCacheService,
    categories: CategoryCacheService,
}

impl ServiceManager {
    /// 用给定的文档存储组装全部服务
    pub async fn new(config: Config, store: SharedDocumentStore) -> AppResult<Self> {
        let cache = Arc::new(TieredCache::new(TieredCacheConfig::from_settings(&config.cache)).await);

        let monitor = Arc::new(PerformanceMonitor::new(config.monitor.clone())?);
        monitor.install_default_rules().await;
        monitor.set_cache(Arc::clone(&cache)).await;
        monitor.set_storage(Arc::clone(&store)).await;

        let rate_limiter: SharedRateLimitService = Arc::new(RateLimitService::new());

        let keys = CacheKeyBuilder::new(&config.cache.key_prefix);
        let users = UserCacheService::new(Arc::clone(&store), keys.clone(), &config.cache);
        let templates = TemplateCacheService::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            keys.clone(),
            &config.cache,
        );
        let categories = CategoryCacheService::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            keys,
            &config.cache,
        );

        info!("🚀 缓存加速层初始化完成");
        Ok(Self {
            config,
            store,
            cache,
            monitor,
            rate_limiter,
            users,
            templates,
            categories,
        })
    }

    /// 按配置连接Postgres文档存储后组装（生产入口）
    pub async fn connect(config: Config) -> AppResult<Self> {
        let store: SharedDocumentStore = Arc::new(PgDocumentStore::new(&config.storage_url).await?);
        Self::new(config, store).await
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn rate_limiter(&self) -> &SharedRateLimitService {
        &self.rate_limiter
    }

    pub fn users(&self) -> &UserCacheService {
        &self.users
    }

    pub fn templates(&self) -> &TemplateCacheService {
        &self.templates
    }

    pub fn categories(&self) -> &CategoryCacheService {
        &self.categories
    }

    pub fn store(&self) -> &SharedDocumentStore {
        &self.store
    }

    /// 登录保护：按IP与按账号双维度叠加限流
    ///
    /// IP维度阈值放宽（同一出口IP后可能有多个用户），
    /// 账号维度用配置阈值；先拒绝者生效，拒绝不暴露维度。
    pub async fn guard_login(&self, ip: &str, account: &str) -> AppResult<()> {
        let limits = &self.config.rate_limit;
        let dimensions = vec![
            RateLimitDimension {
                identifier: format!("login:ip:{}", ip),
                max_requests: limits.login_max_requests.saturating_mul(4),
                window: Duration::from_millis(limits.login_window_ms),
            },
            RateLimitDimension {
                identifier: format!("login:account:{}", account.to_lowercase()),
                max_requests: limits.login_max_requests,
                window: Duration::from_millis(limits.login_window_ms),
            },
        ];
        self.rate_limiter.check_layered(&dimensions).await
    }

    /// 搜索保护：按IP限流
    pub async fn guard_search(&self, ip: &str) -> AppResult<()> {
        let limits = &self.config.rate_limit;
        let decision = self
            .rate_limiter
            .check(
                &format!("search:ip:{}", ip),
                limits.search_max_requests,
                Duration::from_millis(limits.search_window_ms),
            )
            .await;
        if decision.allowed {
            Ok(())
        } else {
            Err(crate::shared::AppError::RateLimited {
                reset_in_ms: decision.reset_in_ms,
            })
        }
    }

    /// 上传保护：按IP限流
    pub async fn guard_upload(&self, ip: &str) -> AppResult<()> {
        let limits = &self.config.rate_limit;
        let decision = self
            .rate_limiter
            .check(
                &format!("upload:ip:{}", ip),
                limits.upload_max_requests,
                Duration::from_millis(limits.upload_window_ms),
            )
            .await;
        if decision.allowed {
            Ok(())
        } else {
            Err(crate::shared::AppError::RateLimited {
                reset_in_ms: decision.reset_in_ms,
            })
        }
    }

    /// 健康状态快照
    pub async fn health(&self) -> HealthStatus {
        self.monitor.get_health().await
    }

    /// 停止所有后台任务
    pub fn close(&self) {
        self.cache.close();
        self.rate_limiter.close();
        self.users.close();
        self.templates.close();
        self.categories.close();
        info!("🛑 缓存加速层已关闭");
    }
}

/// 全进程共享的编排器句柄
pub type SharedServiceManager = Arc<ServiceManager>;
