//! 业务服务模块
//!
//! 实现实体缓存、限流、监控、热度打分与服务编排

pub mod entity_cache;
pub mod rate_limit_service;
pub mod monitor_service;
pub mod popularity;
pub mod user_service;
pub mod template_service;
pub mod category_service;
pub mod service_manager;

// 重新导出常用类型
pub use category_service::CategoryCacheService;
pub use entity_cache::EntityCache;
pub use monitor_service::{
    AggregatedMetrics, AlertRule, AlertSeverity, FiredAlert, HealthLevel, HealthStatus,
    MetricsFormat, PerformanceMonitor, RequestMetric, RouteStats, SharedPerformanceMonitor,
};
pub use popularity::PopularityScorer;
pub use rate_limit_service::{
    RateLimitDecision, RateLimitDimension, RateLimitService, SharedRateLimitService,
};
pub use service_manager::{ServiceManager, SharedServiceManager};
pub use template_service::{TemplateCacheService, TemplateSearchQuery};
pub use user_service::UserCacheService;
