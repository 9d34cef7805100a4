//! 性能监控服务
//!
//! 逐请求吸收指标，维护有界滚动缓冲，计算滑动窗口聚合
//! （索引法分位数、错误率、缓存命中率、按路由细分），
//! 周期性评估告警规则（带冷却），并输出健康状态快照。
//! 记录与聚合永远不向调用方抛错：坏指标就地丢弃并记日志。

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::infrastructure::cache::TieredCache;
use crate::infrastructure::config::MonitorSettings;
use crate::infrastructure::storage::SharedDocumentStore;
use crate::shared::constants::monitoring;
use crate::shared::{AppError, AppResult};

/// 延迟直方图的桶边界（毫秒）
static LATENCY_BUCKETS_MS: Lazy<Vec<f64>> = Lazy::new(|| {
    vec![
        5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
    ]
});

/// 单次请求的不可变指标记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetric {
    pub route: String,
    pub method: String,
    pub status_code: u16,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub cache_hit: Option<bool>,
    #[serde(default)]
    pub db_query_count: Option<u32>,
    #[serde(default)]
    pub db_query_time_ms: Option<u64>,
    #[serde(default)]
    pub memory_usage_mb: Option<f64>,
    #[serde(default)]
    pub error_kind: Option<String>,
}

impl RequestMetric {
    /// 创建基础指标记录，可选字段用链式方法补充
    pub fn new(method: &str, route: &str, status_code: u16, duration_ms: u64) -> Self {
        Self {
            route: route.to_string(),
            method: method.to_string(),
            status_code,
            duration_ms,
            timestamp: Utc::now(),
            cache_hit: None,
            db_query_count: None,
            db_query_time_ms: None,
            memory_usage_mb: None,
            error_kind: None,
        }
    }

    pub fn with_cache_hit(mut self, hit: bool) -> Self {
        self.cache_hit = Some(hit);
        self
    }

    pub fn with_db_queries(mut self, count: u32, time_ms: u64) -> Self {
        self.db_query_count = Some(count);
        self.db_query_time_ms = Some(time_ms);
        self
    }

    pub fn with_memory_usage(mut self, memory_mb: f64) -> Self {
        self.memory_usage_mb = Some(memory_mb);
        self
    }

    pub fn with_error_kind(mut self, kind: &str) -> Self {
        self.error_kind = Some(kind.to_string());
        self
    }
}

/// 按路由细分的统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteStats {
    pub count: u64,
    pub avg_duration_ms: f64,
    pub error_rate: f64,
}

/// 时间窗口内的聚合指标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub window_minutes: i64,
    pub request_count: usize,
    pub avg_duration_ms: f64,
    pub p95_duration_ms: u64,
    pub p99_duration_ms: u64,
    /// 状态码>=400的请求占比
    pub error_rate: f64,
    /// 上报了缓存标记的请求中的命中占比
    pub cache_hit_rate: f64,
    pub requests_per_minute: f64,
    pub avg_db_query_time_ms: Option<f64>,
    pub avg_memory_usage_mb: Option<f64>,
    /// 以 "方法 路由" 为键的细分统计
    pub routes: HashMap<String, RouteStats>,
}

impl AggregatedMetrics {
    fn empty(window_minutes: i64) -> Self {
        Self {
            window_minutes,
            request_count: 0,
            avg_duration_ms: 0.0,
            p95_duration_ms: 0,
            p99_duration_ms: 0,
            error_rate: 0.0,
            cache_hit_rate: 0.0,
            requests_per_minute: 0.0,
            avg_db_query_time_ms: None,
            avg_memory_usage_mb: None,
            routes: HashMap::new(),
        }
    }
}

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// 告警规则
///
/// 规则之间相互独立，评估顺序无关紧要；
/// 同一轮评估里所有满足条件且冷却期已过的规则一起触发。
pub struct AlertRule {
    pub name: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub cooldown_minutes: i64,
    predicate: Box<dyn Fn(&AggregatedMetrics) -> bool + Send + Sync>,
}

impl AlertRule {
    pub fn new(
        name: &str,
        message: &str,
        severity: AlertSeverity,
        cooldown_minutes: i64,
        predicate: impl Fn(&AggregatedMetrics) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
            severity,
            cooldown_minutes,
            predicate: Box::new(predicate),
        }
    }
}

impl fmt::Debug for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertRule")
            .field("name", &self.name)
            .field("severity", &self.severity)
            .field("cooldown_minutes", &self.cooldown_minutes)
            .finish()
    }
}

/// 已触发的告警记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiredAlert {
    pub rule_name: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub fired_at: DateTime<Utc>,
}

/// 健康等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
}

/// 健康状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub level: HealthLevel,
    /// 各单项检查的通过情况
    pub checks: HashMap<String, bool>,
    pub passed: usize,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

/// 指标导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsFormat {
    /// 行式纯文本（Prometheus暴露格式）
    Prometheus,
    Json,
}

/// 内部规则状态：规则与上次触发时间配对
struct RuleState {
    rule: AlertRule,
    last_triggered_at: Option<DateTime<Utc>>,
}

/// 性能监控服务
pub struct PerformanceMonitor {
    settings: MonitorSettings,
    buffer: Arc<RwLock<VecDeque<RequestMetric>>>,
    rules: Arc<RwLock<Vec<RuleState>>>,
    alert_history: Arc<RwLock<VecDeque<FiredAlert>>>,
    recorded_count: AtomicU64,

    // 健康检查探针（构造后注入）
    cache_probe: RwLock<Option<Arc<TieredCache>>>,
    storage_probe: RwLock<Option<SharedDocumentStore>>,

    // Prometheus导出
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
    cache_hits_total: IntCounter,
    cache_misses_total: IntCounter,
    alerts_fired_total: IntCounterVec,
}

impl PerformanceMonitor {
    /// 创建监控服务并装载默认告警规则
    pub fn new(settings: MonitorSettings) -> AppResult<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("hub_requests_total", "请求总数"),
            &["method", "route", "status"],
        )
        .map_err(|e| AppError::Internal(format!("指标注册失败: {}", e)))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("hub_request_duration_ms", "请求耗时（毫秒）")
                .buckets(LATENCY_BUCKETS_MS.clone()),
            &["method", "route"],
        )
        .map_err(|e| AppError::Internal(format!("指标注册失败: {}", e)))?;

        let cache_hits_total =
            IntCounter::new("hub_cache_hits_total", "缓存命中总数")
                .map_err(|e| AppError::Internal(format!("指标注册失败: {}", e)))?;
        let cache_misses_total =
            IntCounter::new("hub_cache_misses_total", "缓存未命中总数")
                .map_err(|e| AppError::Internal(format!("指标注册失败: {}", e)))?;

        let alerts_fired_total = IntCounterVec::new(
            Opts::new("hub_alerts_fired_total", "已触发告警总数"),
            &["rule", "severity"],
        )
        .map_err(|e| AppError::Internal(format!("指标注册失败: {}", e)))?;

        for collector in [
            Box::new(requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(request_duration.clone()),
            Box::new(cache_hits_total.clone()),
            Box::new(cache_misses_total.clone()),
            Box::new(alerts_fired_total.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| AppError::Internal(format!("指标注册失败: {}", e)))?;
        }

        let monitor = Self {
            rules: Arc::new(RwLock::new(Vec::new())),
            settings,
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(
                monitoring::METRICS_BUFFER_SIZE,
            ))),
            alert_history: Arc::new(RwLock::new(VecDeque::with_capacity(
                monitoring::ALERT_HISTORY_SIZE,
            ))),
            recorded_count: AtomicU64::new(0),
            cache_probe: RwLock::new(None),
            storage_probe: RwLock::new(None),
            registry,
            requests_total,
            request_duration,
            cache_hits_total,
            cache_misses_total,
            alerts_fired_total,
        };

        Ok(monitor)
    }

    /// 装载默认告警规则（阈值来自监控配置）
    pub async fn install_default_rules(&self) {
        let error_threshold = self.settings.error_rate_threshold;
        let p95_threshold = self.settings.p95_threshold_ms;
        let memory_threshold = self.settings.memory_threshold_mb;
        let cooldown = self.settings.alert_cooldown_minutes;

        self.add_rule(AlertRule::new(
            "high_error_rate",
            "错误率超过阈值",
            AlertSeverity::Critical,
            cooldown,
            move |agg| agg.request_count >= 20 && agg.error_rate > error_threshold,
        ))
        .await;

        self.add_rule(AlertRule::new(
            "slow_p95_latency",
            "p95响应时间超过阈值",
            AlertSeverity::Warning,
            cooldown,
            move |agg| agg.request_count >= 20 && (agg.p95_duration_ms as f64) > p95_threshold,
        ))
        .await;

        self.add_rule(AlertRule::new(
            "low_cache_hit_rate",
            "缓存命中率过低",
            AlertSeverity::Warning,
            cooldown,
            move |agg| agg.request_count >= 50 && agg.cache_hit_rate < 0.5,
        ))
        .await;

        self.add_rule(AlertRule::new(
            "memory_pressure",
            "内存占用超过阈值",
            AlertSeverity::Critical,
            cooldown,
            move |agg| {
                agg.avg_memory_usage_mb
                    .map_or(false, |memory| memory > memory_threshold)
            },
        ))
        .await;
    }

    /// 追加告警规则
    pub async fn add_rule(&self, rule: AlertRule) {
        self.rules.write().await.push(RuleState {
            rule,
            last_triggered_at: None,
        });
    }

    /// 注入缓存健康探针
    pub async fn set_cache(&self, cache: Arc<TieredCache>) {
        *self.cache_probe.write().await = Some(cache);
    }

    /// 注入存储健康探针
    pub async fn set_storage(&self, store: SharedDocumentStore) {
        *self.storage_probe.write().await = Some(store);
    }

    /// 记录一条请求指标
    ///
    /// 任何异常都不会传给调用方；非法指标丢弃并记日志。
    /// 每记录一批（默认100条）对最近10分钟聚合评估一次告警规则。
    pub async fn record(&self, metric: RequestMetric) {
        if metric.route.is_empty() || metric.method.is_empty() {
            warn!("丢弃非法指标: route/method为空");
            return;
        }

        // Prometheus计数
        let status_label = metric.status_code.to_string();
        self.requests_total
            .with_label_values(&[
                metric.method.as_str(),
                metric.route.as_str(),
                status_label.as_str(),
            ])
            .inc();
        self.request_duration
            .with_label_values(&[metric.method.as_str(), metric.route.as_str()])
            .observe(metric.duration_ms as f64);
        match metric.cache_hit {
            Some(true) => self.cache_hits_total.inc(),
            Some(false) => self.cache_misses_total.inc(),
            None => {}
        }

        // 滚动缓冲：容量与保留时长双重上界
        {
            let mut buffer = self.buffer.write().await;
            while buffer.len() >= monitoring::METRICS_BUFFER_SIZE {
                buffer.pop_front();
            }
            let retention_cutoff =
                Utc::now() - Duration::hours(monitoring::METRICS_RETENTION_HOURS);
            while buffer
                .front()
                .map_or(false, |m| m.timestamp < retention_cutoff)
            {
                buffer.pop_front();
            }
            buffer.push_back(metric);
        }

        let recorded = self.recorded_count.fetch_add(1, Ordering::Relaxed) + 1;
        if recorded % monitoring::ALERT_EVALUATION_INTERVAL == 0 {
            self.evaluate_alerts().await;
        }
    }

    /// 计算指定时间窗口的聚合指标
    pub async fn get_aggregate(&self, window_minutes: i64) -> AggregatedMetrics {
        let cutoff = Utc::now() - Duration::minutes(window_minutes);
        let buffer = self.buffer.read().await;

        let window: Vec<&RequestMetric> =
            buffer.iter().filter(|m| m.timestamp >= cutoff).collect();
        if window.is_empty() {
            return AggregatedMetrics::empty(window_minutes);
        }

        let n = window.len();
        let mut durations: Vec<u64> = window.iter().map(|m| m.duration_ms).collect();
        durations.sort_unstable();

        let p95 = durations[percentile_index(n, 0.95)];
        let p99 = durations[percentile_index(n, 0.99)];
        let total_duration: u64 = durations.iter().sum();

        let error_count = window.iter().filter(|m| m.status_code >= 400).count();

        let cache_flagged: Vec<bool> = window.iter().filter_map(|m| m.cache_hit).collect();
        let cache_hit_rate = if cache_flagged.is_empty() {
            0.0
        } else {
            cache_flagged.iter().filter(|hit| **hit).count() as f64 / cache_flagged.len() as f64
        };

        let db_times: Vec<u64> = window.iter().filter_map(|m| m.db_query_time_ms).collect();
        let avg_db_query_time_ms = if db_times.is_empty() {
            None
        } else {
            Some(db_times.iter().sum::<u64>() as f64 / db_times.len() as f64)
        };

        let memory_samples: Vec<f64> = window.iter().filter_map(|m| m.memory_usage_mb).collect();
        let avg_memory_usage_mb = if memory_samples.is_empty() {
            None
        } else {
            Some(memory_samples.iter().sum::<f64>() / memory_samples.len() as f64)
        };

        // 按 "方法 路由" 细分
        let mut routes: HashMap<String, RouteStats> = HashMap::new();
        let mut route_totals: HashMap<String, (u64, u64)> = HashMap::new(); // (总耗时, 错误数)
        for metric in &window {
            let key = format!("{} {}", metric.method, metric.route);
            let stats = routes.entry(key.clone()).or_default();
            stats.count += 1;
            let totals = route_totals.entry(key).or_insert((0, 0));
            totals.0 += metric.duration_ms;
            if metric.status_code >= 400 {
                totals.1 += 1;
            }
        }
        for (key, stats) in routes.iter_mut() {
            if let Some((total, errors)) = route_totals.get(key) {
                stats.avg_duration_ms = *total as f64 / stats.count as f64;
                stats.error_rate = *errors as f64 / stats.count as f64;
            }
        }

        AggregatedMetrics {
            window_minutes,
            request_count: n,
            avg_duration_ms: total_duration as f64 / n as f64,
            p95_duration_ms: p95,
            p99_duration_ms: p99,
            error_rate: error_count as f64 / n as f64,
            cache_hit_rate,
            requests_per_minute: n as f64 / window_minutes as f64,
            avg_db_query_time_ms,
            avg_memory_usage_mb,
            routes,
        }
    }

    /// 评估所有告警规则
    ///
    /// 满足条件且冷却期已过的规则全部在本轮触发并重置冷却。
    pub async fn evaluate_alerts(&self) {
        let aggregate = self
            .get_aggregate(monitoring::ALERT_AGGREGATE_WINDOW_MINUTES)
            .await;
        let now = Utc::now();

        let mut rules = self.rules.write().await;
        for state in rules.iter_mut() {
            if !(state.rule.predicate)(&aggregate) {
                continue;
            }

            let cooldown_elapsed = state.last_triggered_at.map_or(true, |last| {
                now - last >= Duration::minutes(state.rule.cooldown_minutes)
            });
            if !cooldown_elapsed {
                continue;
            }

            state.last_triggered_at = Some(now);
            self.alerts_fired_total
                .with_label_values(&[state.rule.name.as_str(), state.rule.severity.as_str()])
                .inc();
            warn!(
                "🚨 告警触发: rule={}, severity={}, message={}",
                state.rule.name,
                state.rule.severity.as_str(),
                state.rule.message
            );

            let mut history = self.alert_history.write().await;
            while history.len() >= monitoring::ALERT_HISTORY_SIZE {
                history.pop_front();
            }
            history.push_back(FiredAlert {
                rule_name: state.rule.name.clone(),
                message: state.rule.message.clone(),
                severity: state.rule.severity,
                fired_at: now,
            });
        }
    }

    /// 最近触发的告警
    pub async fn alert_history(&self) -> Vec<FiredAlert> {
        self.alert_history.read().await.iter().cloned().collect()
    }

    /// 健康状态快照
    ///
    /// 全部通过为healthy，通过率达到六成为degraded，否则unhealthy。
    pub async fn get_health(&self) -> HealthStatus {
        let aggregate = self
            .get_aggregate(monitoring::ALERT_AGGREGATE_WINDOW_MINUTES)
            .await;
        let mut checks = HashMap::new();

        // 两个外部探针互不依赖，并发执行
        let cache_probe = self.cache_probe.read().await.clone();
        let storage_probe = self.storage_probe.read().await.clone();
        let (cache_reachable, storage_reachable) = futures::join!(
            async {
                match cache_probe {
                    Some(cache) => {
                        let health = cache.health_check().await;
                        Some(if health.remote_configured {
                            health.remote_healthy
                        } else {
                            health.local_healthy
                        })
                    }
                    None => None,
                }
            },
            async {
                match storage_probe {
                    Some(store) => Some(store.ping().await.is_ok()),
                    None => None,
                }
            }
        );

        if let Some(reachable) = cache_reachable {
            checks.insert("cache_reachable".to_string(), reachable);
        }
        if let Some(reachable) = storage_reachable {
            checks.insert("storage_reachable".to_string(), reachable);
        }

        checks.insert(
            "p95_under_threshold".to_string(),
            aggregate.request_count == 0
                || (aggregate.p95_duration_ms as f64) < self.settings.p95_threshold_ms,
        );
        checks.insert(
            "error_rate_under_threshold".to_string(),
            aggregate.error_rate <= self.settings.error_rate_threshold,
        );
        checks.insert(
            "memory_under_threshold".to_string(),
            aggregate
                .avg_memory_usage_mb
                .map_or(true, |memory| memory < self.settings.memory_threshold_mb),
        );

        let total = checks.len();
        let passed = checks.values().filter(|ok| **ok).count();
        let ratio = passed as f64 / total as f64;

        let level = if passed == total {
            HealthLevel::Healthy
        } else if ratio >= monitoring::DEGRADED_PASS_RATIO {
            HealthLevel::Degraded
        } else {
            HealthLevel::Unhealthy
        };

        debug!("健康检查: level={:?}, passed={}/{}", level, passed, total);
        HealthStatus {
            level,
            checks,
            passed,
            total,
            timestamp: Utc::now(),
        }
    }

    /// 导出指标
    pub async fn export_metrics(&self, format: MetricsFormat) -> AppResult<String> {
        match format {
            MetricsFormat::Prometheus => {
                let families = self.registry.gather();
                let mut buffer = Vec::new();
                TextEncoder::new()
                    .encode(&families, &mut buffer)
                    .map_err(|e| AppError::Internal(format!("指标编码失败: {}", e)))?;
                String::from_utf8(buffer)
                    .map_err(|e| AppError::Internal(format!("指标编码失败: {}", e)))
            }
            MetricsFormat::Json => {
                let aggregate = self.get_aggregate(60).await;
                let alerts = self.alert_history().await;
                Ok(serde_json::to_string_pretty(&json!({
                    "aggregate": aggregate,
                    "recent_alerts": alerts,
                }))?)
            }
        }
    }

    /// 已吸收的指标总数
    pub fn recorded_count(&self) -> u64 {
        self.recorded_count.load(Ordering::Relaxed)
    }
}

/// 索引法分位数下标：floor(n * q)，越界时取末位
fn percentile_index(n: usize, quantile: f64) -> usize {
    ((n as f64 * quantile).floor() as usize).min(n - 1)
}

/// 全局监控服务句柄
pub type SharedPerformanceMonitor = Arc<PerformanceMonitor>;

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> MonitorSettings {
        MonitorSettings {
            p95_threshold_ms: 2000.0,
            error_rate_threshold: 0.05,
            memory_threshold_mb: 512.0,
            alert_cooldown_minutes: 15,
        }
    }

    #[tokio::test]
    async fn percentiles_match_index_formula() {
        let monitor = PerformanceMonitor::new(test_settings()).expect("创建监控应成功");

        // 100条已知耗时：1..=100毫秒
        for duration in 1..=100u64 {
            monitor
                .record(RequestMetric::new("GET", "/api/templates", 200, duration))
                .await;
        }

        let aggregate = monitor.get_aggregate(10).await;
        assert_eq!(aggregate.request_count, 100);
        // floor(100*0.95)=95 → 排序后下标95的值是96
        assert_eq!(aggregate.p95_duration_ms, 96);
        // floor(100*0.99)=99 → 排序后下标99的值是100
        assert_eq!(aggregate.p99_duration_ms, 100);
        assert!((aggregate.avg_duration_ms - 50.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn error_and_cache_rates() {
        let monitor = PerformanceMonitor::new(test_settings()).expect("创建监控应成功");

        for i in 0..10u64 {
            let status = if i < 2 { 500 } else { 200 };
            let metric = RequestMetric::new("GET", "/api/users", status, 10)
                .with_cache_hit(i % 2 == 0);
            monitor.record(metric).await;
        }

        let aggregate = monitor.get_aggregate(10).await;
        assert!((aggregate.error_rate - 0.2).abs() < 1e-9);
        assert!((aggregate.cache_hit_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn per_route_breakdown() {
        let monitor = PerformanceMonitor::new(test_settings()).expect("创建监控应成功");

        monitor
            .record(RequestMetric::new("GET", "/api/templates", 200, 10))
            .await;
        monitor
            .record(RequestMetric::new("GET", "/api/templates", 500, 30))
            .await;
        monitor
            .record(RequestMetric::new("POST", "/api/templates", 201, 50))
            .await;

        let aggregate = monitor.get_aggregate(10).await;
        let get_stats = &aggregate.routes["GET /api/templates"];
        assert_eq!(get_stats.count, 2);
        assert!((get_stats.avg_duration_ms - 20.0).abs() < 1e-9);
        assert!((get_stats.error_rate - 0.5).abs() < 1e-9);

        let post_stats = &aggregate.routes["POST /api/templates"];
        assert_eq!(post_stats.count, 1);
        assert_eq!(post_stats.error_rate, 0.0);
    }

    #[tokio::test]
    async fn broken_metric_dropped_without_panic() {
        let monitor = PerformanceMonitor::new(test_settings()).expect("创建监控应成功");

        monitor.record(RequestMetric::new("", "", 200, 10)).await;

        let aggregate = monitor.get_aggregate(10).await;
        assert_eq!(aggregate.request_count, 0, "非法指标应被丢弃");
    }

    #[tokio::test]
    async fn alert_fires_once_within_cooldown() {
        let monitor = PerformanceMonitor::new(test_settings()).expect("创建监控应成功");
        monitor
            .add_rule(AlertRule::new(
                "always_true",
                "测试规则",
                AlertSeverity::Warning,
                15,
                |_| true,
            ))
            .await;

        // 谓词持续为真，多轮评估也只能触发一次
        monitor.evaluate_alerts().await;
        monitor.evaluate_alerts().await;
        monitor.evaluate_alerts().await;

        let history = monitor.alert_history().await;
        assert_eq!(history.len(), 1, "冷却期内不得重复触发");
        assert_eq!(history[0].rule_name, "always_true");
    }

    #[tokio::test]
    async fn eligible_rules_fire_in_same_pass() {
        let monitor = PerformanceMonitor::new(test_settings()).expect("创建监控应成功");
        monitor
            .add_rule(AlertRule::new("rule_a", "a", AlertSeverity::Info, 15, |_| true))
            .await;
        monitor
            .add_rule(AlertRule::new("rule_b", "b", AlertSeverity::Critical, 15, |_| true))
            .await;

        monitor.evaluate_alerts().await;

        let history = monitor.alert_history().await;
        let names: Vec<&str> = history.iter().map(|a| a.rule_name.as_str()).collect();
        assert!(names.contains(&"rule_a"));
        assert!(names.contains(&"rule_b"));
    }

    #[tokio::test]
    async fn default_error_rate_rule_fires_on_bad_window() {
        let monitor = PerformanceMonitor::new(test_settings()).expect("创建监控应成功");
        monitor.install_default_rules().await;

        // 100条指标里一半5xx，错误率远超阈值；第100条触发周期评估
        for i in 0..100u64 {
            let status = if i % 2 == 0 { 500 } else { 200 };
            monitor
                .record(RequestMetric::new("GET", "/api/templates", status, 10))
                .await;
        }

        let history = monitor.alert_history().await;
        assert!(
            history.iter().any(|a| a.rule_name == "high_error_rate"),
            "高错误率规则应在周期评估中触发"
        );
    }

    #[tokio::test]
    async fn health_levels() {
        let monitor = PerformanceMonitor::new(test_settings()).expect("创建监控应成功");

        // 无数据时所有内置检查通过
        let health = monitor.get_health().await;
        assert_eq!(health.level, HealthLevel::Healthy);

        // 高错误率压低通过率
        for _ in 0..20 {
            monitor
                .record(RequestMetric::new("GET", "/api/x", 500, 5000).with_memory_usage(1024.0))
                .await;
        }
        let health = monitor.get_health().await;
        assert_ne!(health.level, HealthLevel::Healthy);
    }

    #[tokio::test]
    async fn export_prometheus_text_and_json() {
        let monitor = PerformanceMonitor::new(test_settings()).expect("创建监控应成功");
        monitor
            .record(RequestMetric::new("GET", "/api/templates", 200, 10).with_cache_hit(true))
            .await;

        let text = monitor
            .export_metrics(MetricsFormat::Prometheus)
            .await
            .expect("导出应成功");
        assert!(text.contains("hub_requests_total"));
        assert!(text.contains("hub_cache_hits_total"));

        let json_out = monitor
            .export_metrics(MetricsFormat::Json)
            .await
            .expect("导出应成功");
        let parsed: serde_json::Value = serde_json::from_str(&json_out).expect("应为合法JSON");
        assert!(parsed["aggregate"]["request_count"].is_number());
    }

    #[tokio::test]
    async fn buffer_is_bounded() {
        let monitor = PerformanceMonitor::new(test_settings()).expect("创建监控应成功");

        for i in 0..(monitoring::METRICS_BUFFER_SIZE + 500) {
            monitor
                .record(RequestMetric::new("GET", "/api/x", 200, i as u64 % 100))
                .await;
        }

        let buffer_len = monitor.buffer.read().await.len();
        assert!(buffer_len <= monitoring::METRICS_BUFFER_SIZE);
    }
}
