//! 配置管理模块
//!
//! 从环境变量加载全部配置。除存储连接串外所有项都有默认值，
//! 远端缓存配置缺失时系统自动退化为仅本地缓存。

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::shared::constants::{cache, monitoring, rate_limit};
use crate::shared::{AppError, AppResult};

/// 顶层配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 持久化存储连接串（必填，缺失视为致命配置错误）
    pub storage_url: String,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub monitor: MonitorSettings,
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// 远端缓存连接串，None表示未配置远端层
    pub redis_url: Option<String>,
    /// 所有缓存键的统一前缀
    pub key_prefix: String,
    /// 默认TTL（毫秒）
    pub default_ttl_ms: u64,
    /// 各缓存类别的TTL（毫秒）
    pub user_ttl_ms: u64,
    pub template_ttl_ms: u64,
    pub category_ttl_ms: u64,
    pub search_ttl_ms: u64,
    /// 本地缓存容量上限
    pub max_local_entries: usize,
    /// 压缩阈值（字节）
    pub compression_threshold_bytes: usize,
    /// 单值大小硬上限（字节），超出的写入被拒绝
    pub max_payload_bytes: usize,
    /// 后台过期清扫间隔（毫秒）
    pub sweep_interval_ms: u64,
}

/// 速率限制配置（按受保护操作分别设限）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub login_max_requests: u32,
    pub login_window_ms: u64,
    pub search_max_requests: u32,
    pub search_window_ms: u64,
    pub upload_max_requests: u32,
    pub upload_window_ms: u64,
}

/// 监控与告警配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// p95响应时间健康阈值（毫秒）
    pub p95_threshold_ms: f64,
    /// 错误率健康阈值
    pub error_rate_threshold: f64,
    /// 内存占用健康阈值（MB）
    pub memory_threshold_mb: f64,
    /// 告警冷却时间（分钟）
    pub alert_cooldown_minutes: i64,
}

/// 解析环境变量，解析失败或缺失时使用默认值
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    pub fn load() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let storage_url = env::var("STORAGE_URL").map_err(|_| {
            AppError::Configuration("缺少必需的环境变量 STORAGE_URL".to_string())
        })?;

        Ok(Config {
            storage_url,
            cache: CacheSettings::load_from_env(),
            rate_limit: RateLimitSettings::load_from_env(),
            monitor: MonitorSettings::load_from_env(),
        })
    }
}

impl CacheSettings {
    /// 从环境变量加载缓存配置
    pub fn load_from_env() -> Self {
        Self {
            redis_url: Self::compose_redis_url(),
            key_prefix: env::var("CACHE_PREFIX")
                .unwrap_or_else(|_| "template-hub:".to_string()),
            default_ttl_ms: env_or("CACHE_DEFAULT_TTL_MS", cache::DEFAULT_TTL_MS),
            user_ttl_ms: env_or("CACHE_USER_TTL_MS", crate::shared::constants::entity_cache::USER_TTL_MS),
            template_ttl_ms: env_or("CACHE_TEMPLATE_TTL_MS", crate::shared::constants::entity_cache::TEMPLATE_TTL_MS),
            category_ttl_ms: env_or("CACHE_CATEGORY_TTL_MS", crate::shared::constants::entity_cache::CATEGORY_TTL_MS),
            search_ttl_ms: env_or("CACHE_SEARCH_TTL_MS", crate::shared::constants::entity_cache::SEARCH_TTL_MS),
            max_local_entries: env_or("CACHE_MAX_LOCAL_ENTRIES", cache::MAX_LOCAL_ENTRIES),
            compression_threshold_bytes: env_or(
                "CACHE_COMPRESSION_THRESHOLD_BYTES",
                cache::COMPRESSION_THRESHOLD_BYTES,
            ),
            max_payload_bytes: env_or("CACHE_MAX_PAYLOAD_BYTES", cache::MAX_PAYLOAD_BYTES),
            sweep_interval_ms: env_or("CACHE_SWEEP_INTERVAL_MS", cache::SWEEP_INTERVAL_MS),
        }
    }

    /// 由离散的主机/端口/密码/库号环境变量拼出远端连接串
    ///
    /// 未设置 CACHE_REDIS_HOST 时返回None，远端层整体关闭。
    fn compose_redis_url() -> Option<String> {
        if let Ok(url) = env::var("CACHE_REDIS_URL") {
            return Some(url);
        }

        let host = env::var("CACHE_REDIS_HOST").ok()?;
        let port: u16 = env_or("CACHE_REDIS_PORT", 6379);
        let db: u32 = env_or("CACHE_REDIS_DB", 0);

        let url = match env::var("CACHE_REDIS_PASSWORD") {
            Ok(password) if !password.is_empty() => {
                format!("redis://:{}@{}:{}/{}", password, host, port, db)
            }
            _ => format!("redis://{}:{}/{}", host, port, db),
        };
        Some(url)
    }
}

impl RateLimitSettings {
    /// 从环境变量加载速率限制配置
    pub fn load_from_env() -> Self {
        Self {
            login_max_requests: env_or("RATE_LIMIT_LOGIN_MAX", rate_limit::LOGIN_MAX_REQUESTS),
            login_window_ms: env_or("RATE_LIMIT_LOGIN_WINDOW_MS", rate_limit::LOGIN_WINDOW_MS),
            search_max_requests: env_or("RATE_LIMIT_SEARCH_MAX", rate_limit::SEARCH_MAX_REQUESTS),
            search_window_ms: env_or("RATE_LIMIT_SEARCH_WINDOW_MS", rate_limit::SEARCH_WINDOW_MS),
            upload_max_requests: env_or("RATE_LIMIT_UPLOAD_MAX", rate_limit::UPLOAD_MAX_REQUESTS),
            upload_window_ms: env_or("RATE_LIMIT_UPLOAD_WINDOW_MS", rate_limit::UPLOAD_WINDOW_MS),
        }
    }
}

impl MonitorSettings {
    /// 从环境变量加载监控配置
    pub fn load_from_env() -> Self {
        Self {
            p95_threshold_ms: env_or("MONITOR_P95_THRESHOLD_MS", monitoring::P95_THRESHOLD_MS),
            error_rate_threshold: env_or(
                "MONITOR_ERROR_RATE_THRESHOLD",
                monitoring::ERROR_RATE_THRESHOLD,
            ),
            memory_threshold_mb: env_or("MONITOR_MEMORY_THRESHOLD_MB", monitoring::MEMORY_THRESHOLD_MB),
            alert_cooldown_minutes: env_or(
                "MONITOR_ALERT_COOLDOWN_MINUTES",
                monitoring::DEFAULT_ALERT_COOLDOWN_MINUTES,
            ),
        }
    }
}
