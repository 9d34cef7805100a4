//! 基础设施层模块
//!
//! 负责分层缓存、文档存储访问、配置管理等基础设施相关功能

pub mod config;
pub mod cache;
pub mod storage;

// 重新导出常用类型和错误
pub use cache::{CacheError, CacheStats, TieredCache, TieredCacheConfig};
pub use config::Config;
pub use storage::{DocumentStore, SharedDocumentStore, StorageError};
