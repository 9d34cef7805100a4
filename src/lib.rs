//! Template Hub 缓存加速层
//!
//! 纯Rust实现的分层缓存/限流/监控核心，基于三层架构设计。
//! 作为库被请求处理层调用，不直接暴露HTTP路由。

// 核心模块
pub mod shared;          // 共享模块（错误处理、类型定义、工具函数）
pub mod infrastructure;  // 基础设施层（分层缓存、文档存储、配置）
pub mod business;        // 业务逻辑层（领域模型、实体缓存服务、限流、监控）

// 重新导出核心类型
pub use infrastructure::{Config, TieredCache};
pub use shared::{AppError, AppResult};
pub use business::services::{ServiceManager, SharedServiceManager};
