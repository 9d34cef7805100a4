//! 共享类型定义模块

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 文档ID类型（文档存储统一使用字符串主键）
pub type DocumentId = String;

/// 实体类别
///
/// 每类实体拥有独立的缓存命名空间，避免不同实体间的短键冲突。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Template,
    Category,
}

impl EntityKind {
    /// 缓存键命名空间前缀
    pub fn namespace(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Template => "template",
            EntityKind::Category => "category",
        }
    }

    /// 对应的文档存储集合名
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Template => "templates",
            EntityKind::Category => "categories",
        }
    }
}

/// 排行/搜索的时间范围过滤
///
/// 过滤发生在打分之前：范围限制的是候选集（按创建时间），而不是展示顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Week,
    Month,
    Year,
    All,
}

impl Timeframe {
    /// 候选集的创建时间下界，All表示不过滤
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Timeframe::Week => Some(now - Duration::days(7)),
            Timeframe::Month => Some(now - Duration::days(30)),
            Timeframe::Year => Some(now - Duration::days(365)),
            Timeframe::All => None,
        }
    }

    /// 缓存键中使用的稳定标签
    pub fn as_key(&self) -> &'static str {
        match self {
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Year => "year",
            Timeframe::All => "all",
        }
    }
}
