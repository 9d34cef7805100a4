//! 速率限制服务
//!
//! 固定窗口计数限流，按任意标识符（IP、邮箱、账号等）设限。
//! 算法特性：窗口边界附近最多放行2倍配额，这是固定窗口的已知行为，
//! 依赖方按此宽松上界假设，不做滑动窗口升级。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::shared::constants::rate_limit;
use crate::shared::{AppError, AppResult};

/// 单个标识符的计数窗口
#[derive(Debug, Clone)]
struct RateLimitWindow {
    count: u32,
    reset_at: Instant,
}

/// 限流判定结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// 当前窗口内剩余配额
    pub remaining: u32,
    /// 距离窗口重置的毫秒数
    pub reset_in_ms: u64,
    /// 窗口重置的墙钟时间（对外展示用）
    pub reset_at: DateTime<Utc>,
}

/// 叠加限流的单个维度（标识符 + 配额 + 窗口）
#[derive(Debug, Clone)]
pub struct RateLimitDimension {
    pub identifier: String,
    pub max_requests: u32,
    pub window: Duration,
}

/// 速率限制服务
///
/// 检查-递增在单个写锁内完成，是一个原子步骤；
/// 后台任务定期清理已过期的窗口，标识符表的内存因此有界。
pub struct RateLimitService {
    windows: Arc<RwLock<HashMap<String, RateLimitWindow>>>,
    shutdown: watch::Sender<bool>,
}

impl RateLimitService {
    /// 创建限流服务并启动后台清理任务
    pub fn new() -> Self {
        let windows: Arc<RwLock<HashMap<String, RateLimitWindow>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let sweep_windows = Arc::clone(&windows);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(rate_limit::CLEANUP_INTERVAL_MS));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Instant::now();
                        let mut guard = sweep_windows.write().await;
                        let before = guard.len();
                        guard.retain(|_, window| window.reset_at > now);
                        let removed = before - guard.len();
                        if removed > 0 {
                            info!("🧹 清理过期限流窗口: removed={}, remaining={}", removed, guard.len());
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("限流清理任务退出");
                        break;
                    }
                }
            }
        });

        Self { windows, shutdown }
    }

    /// 检查并计数
    ///
    /// 首次请求或窗口已过期时开新窗口并计1；
    /// 超限请求被拒绝且不再递增计数。
    pub async fn check(
        &self,
        identifier: &str,
        max_requests: u32,
        window: Duration,
    ) -> RateLimitDecision {
        let now = Instant::now();

        let mut windows = self.windows.write().await;
        let entry = windows
            .entry(identifier.to_string())
            .or_insert_with(|| RateLimitWindow {
                count: 0,
                reset_at: now + window,
            });

        // 上一窗口已过期则自动开新窗口
        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        let (allowed, remaining) = if entry.count >= max_requests {
            warn!(
                "⚠️ 限流拒绝: identifier={}, count={}/{}",
                identifier, entry.count, max_requests
            );
            (false, 0)
        } else {
            entry.count += 1;
            (true, max_requests - entry.count)
        };

        let reset_in = entry.reset_at.saturating_duration_since(now);
        debug!(
            "限流检查: identifier={}, allowed={}, remaining={}",
            identifier, allowed, remaining
        );

        RateLimitDecision {
            allowed,
            remaining,
            reset_in_ms: reset_in.as_millis() as u64,
            reset_at: Utc::now() + chrono::Duration::milliseconds(reset_in.as_millis() as i64),
        }
    }

    /// 多维度叠加限流（如认证流程的按IP与按账号双重限制）
    ///
    /// 逐维度检查，先拒绝者生效；返回的错误不携带触发维度信息，
    /// 避免成为账号枚举的侧信道。
    pub async fn check_layered(&self, dimensions: &[RateLimitDimension]) -> AppResult<()> {
        for dimension in dimensions {
            let decision = self
                .check(&dimension.identifier, dimension.max_requests, dimension.window)
                .await;
            if !decision.allowed {
                return Err(AppError::RateLimited {
                    reset_in_ms: decision.reset_in_ms,
                });
            }
        }
        Ok(())
    }

    /// 当前跟踪的标识符数量
    pub async fn tracked_identifiers(&self) -> usize {
        self.windows.read().await.len()
    }

    /// 立即清理过期窗口（后台任务之外的手动入口）
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, window| window.reset_at > now);
        before - windows.len()
    }

    /// 停止后台清理任务
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Default for RateLimitService {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局限流服务句柄
pub type SharedRateLimitService = Arc<RateLimitService>;
