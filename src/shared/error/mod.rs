//! 统一错误处理模块
//!
//! 定义系统中所有错误类型，提供统一的错误处理机制。
//! 错误分四类：容量类（内部消化，不上抛）、传输类（降级到本地缓存，不上抛）、
//! 配额类（唯一需要上抛给调用方的错误）、配置类（启动时致命）。

use thiserror::Error;

use crate::infrastructure::cache::CacheError;
use crate::infrastructure::storage::StorageError;

/// 应用程序统一错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 持久化存储相关错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    /// 缓存传输层错误（仅内部流转，策略层负责降级）
    #[error("缓存错误: {0}")]
    Cache(#[from] CacheError),

    /// 序列化/反序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 验证错误
    #[error("验证错误: {0}")]
    Validation(String),

    /// 配置错误（启动时致命，不重试）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 速率限制错误（唯一对调用方可见的拒绝）
    #[error("请求过于频繁，{reset_in_ms}毫秒后重试")]
    RateLimited {
        /// 距离窗口重置的毫秒数
        reset_in_ms: u64,
    },

    /// 资源未找到错误
    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AppError {
    /// 获取错误代码（供调用方的响应层映射使用）
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Cache(_) => "CACHE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIG_ERROR",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为速率限制拒绝
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::RateLimited { .. })
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
