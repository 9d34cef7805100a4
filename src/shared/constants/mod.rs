//! 常量定义模块

/// 缓存相关常量
pub mod cache {
    /// 本地缓存默认容量上限
    pub const MAX_LOCAL_ENTRIES: usize = 1000;
    /// 默认TTL（毫秒）
    pub const DEFAULT_TTL_MS: u64 = 300_000; // 5分钟
    /// 超过该序列化大小的值启用压缩
    pub const COMPRESSION_THRESHOLD_BYTES: usize = 1024; // 1KB
    /// 超过该序列化大小的值拒绝写入（保护两级缓存）
    pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024; // 10MB
    /// 后台过期清扫间隔（毫秒）
    pub const SWEEP_INTERVAL_MS: u64 = 60_000;
    /// 远端PING超时（毫秒）
    pub const REMOTE_PING_TIMEOUT_MS: u64 = 1_000;
    /// 响应时间移动平均的平滑系数
    pub const RESPONSE_TIME_EMA_ALPHA: f64 = 0.1;
}

/// 速率限制相关常量
pub mod rate_limit {
    /// 登录保护：每窗口最大次数
    pub const LOGIN_MAX_REQUESTS: u32 = 5;
    /// 登录保护：窗口长度（毫秒）
    pub const LOGIN_WINDOW_MS: u64 = 60_000;
    /// 搜索保护：每窗口最大次数
    pub const SEARCH_MAX_REQUESTS: u32 = 30;
    /// 搜索保护：窗口长度（毫秒）
    pub const SEARCH_WINDOW_MS: u64 = 60_000;
    /// 上传保护：每窗口最大次数
    pub const UPLOAD_MAX_REQUESTS: u32 = 10;
    /// 上传保护：窗口长度（毫秒）
    pub const UPLOAD_WINDOW_MS: u64 = 3_600_000; // 1小时
    /// 过期窗口清理间隔（毫秒）
    pub const CLEANUP_INTERVAL_MS: u64 = 300_000; // 5分钟
}

/// 监控相关常量
pub mod monitoring {
    /// 指标滚动缓冲区容量
    pub const METRICS_BUFFER_SIZE: usize = 10_000;
    /// 指标最长保留时间（小时）
    pub const METRICS_RETENTION_HOURS: i64 = 24;
    /// 每记录N条指标评估一次告警规则
    pub const ALERT_EVALUATION_INTERVAL: u64 = 100;
    /// 告警评估使用的聚合窗口（分钟）
    pub const ALERT_AGGREGATE_WINDOW_MINUTES: i64 = 10;
    /// 告警默认冷却时间（分钟）
    pub const DEFAULT_ALERT_COOLDOWN_MINUTES: i64 = 15;
    /// 告警历史保留条数
    pub const ALERT_HISTORY_SIZE: usize = 100;
    /// p95响应时间健康阈值（毫秒）
    pub const P95_THRESHOLD_MS: f64 = 2_000.0;
    /// 错误率健康阈值
    pub const ERROR_RATE_THRESHOLD: f64 = 0.05;
    /// 内存占用健康阈值（MB）
    pub const MEMORY_THRESHOLD_MB: f64 = 512.0;
    /// 健康检查降级判定的通过率下限
    pub const DEGRADED_PASS_RATIO: f64 = 0.6;
}

/// 热度打分相关常量
pub mod popularity {
    /// 下载量权重
    pub const DOWNLOAD_WEIGHT: f64 = 2.0;
    /// 评分权重
    pub const RATING_WEIGHT: f64 = 10.0;
    /// 浏览量权重
    pub const VIEW_WEIGHT: f64 = 0.1;
    /// 评论数权重
    pub const REVIEW_COUNT_WEIGHT: f64 = 5.0;
    /// 官方推荐加成
    pub const FEATURED_BOOST: f64 = 50.0;
    /// 新近度窗口（天）
    pub const RECENCY_WINDOW_DAYS: f64 = 30.0;
    /// 新近度权重
    pub const RECENCY_WEIGHT: f64 = 1.5;
}

/// 实体缓存相关常量
pub mod entity_cache {
    /// 单个实体缓存的容量上限
    pub const MAX_ENTRIES: usize = 500;
    /// 用户缓存TTL（毫秒）
    pub const USER_TTL_MS: u64 = 600_000; // 10分钟
    /// 模板缓存TTL（毫秒）
    pub const TEMPLATE_TTL_MS: u64 = 300_000; // 5分钟
    /// 分类缓存TTL（毫秒）
    pub const CATEGORY_TTL_MS: u64 = 1_800_000; // 30分钟
    /// 搜索结果缓存TTL（毫秒）
    pub const SEARCH_TTL_MS: u64 = 120_000; // 2分钟
}
