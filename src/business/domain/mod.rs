//! 领域模型定义
//!
//! 完整记录与存储文档一一对应；Cached*投影只保留热点字段，
//! 既控制缓存内存占用，也避免把凭证、正文大字段留在缓存里。
//! 完整记录的归属权在持久化存储，缓存里永远只有投影。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户完整记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub role: UserRole,
    /// 凭证哈希，属于敏感字段，永不进入缓存投影
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Member,
    Moderator,
    Admin,
}

/// 用户缓存投影
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedUser {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: UserRole,
}

impl From<&UserRecord> for CachedUser {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            email: record.email.clone(),
            username: record.username.clone(),
            role: record.role,
        }
    }
}

/// 模板完整记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub category_id: String,
    /// 模板正文，大字段，永不进入缓存投影
    #[serde(default)]
    pub body_markdown: String,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u64,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub featured: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// 模板缓存投影（含热度打分所需的全部参与字段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTemplate {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub author_id: String,
    pub category_id: String,
    pub downloads: u64,
    pub rating: f64,
    pub review_count: u64,
    pub views: u64,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&TemplateRecord> for CachedTemplate {
    fn from(record: &TemplateRecord) -> Self {
        Self {
            id: record.id.clone(),
            slug: record.slug.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            author_id: record.author_id.clone(),
            category_id: record.category_id.clone(),
            downloads: record.downloads,
            rating: record.rating,
            review_count: record.review_count,
            views: record.views,
            featured: record.featured,
            created_at: record.created_at,
        }
    }
}

/// 分类完整记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: String,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub template_count: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// 分类缓存投影
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCategory {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub template_count: u64,
}

impl From<&CategoryRecord> for CachedCategory {
    fn from(record: &CategoryRecord) -> Self {
        Self {
            id: record.id.clone(),
            slug: record.slug.clone(),
            name: record.name.clone(),
            template_count: record.template_count,
        }
    }
}
