//! 热度打分
//!
//! 对模板的参与度信号做确定性打分，供搜索排序与热门列表共用。
//! 同一输入必须产生同一排序，排序键是全序的：
//! 分数、下载量、评分依次比较，最后以文档id兜底定序。

use chrono::{DateTime, Utc};

use crate::business::domain::CachedTemplate;
use crate::shared::constants::popularity;

/// 热度打分器
#[derive(Debug, Clone, Copy, Default)]
pub struct PopularityScorer;

impl PopularityScorer {
    /// 计算单个模板的热度分
    pub fn score(template: &CachedTemplate, now: DateTime<Utc>) -> f64 {
        let age_days = (now - template.created_at).num_days().max(0) as f64;
        let recency_bonus =
            (popularity::RECENCY_WINDOW_DAYS - age_days).max(0.0) * popularity::RECENCY_WEIGHT;
        let featured_boost = if template.featured {
            popularity::FEATURED_BOOST
        } else {
            0.0
        };

        template.downloads as f64 * popularity::DOWNLOAD_WEIGHT
            + template.rating * popularity::RATING_WEIGHT
            + template.views as f64 * popularity::VIEW_WEIGHT
            + template.review_count as f64 * popularity::REVIEW_COUNT_WEIGHT
            + featured_boost
            + recency_bonus
    }

    /// 按热度排序
    ///
    /// 排序键：分数降序 → 下载量降序 → 评分降序 → id升序。
    /// 分数对每个条目只计算一次。
    pub fn rank(templates: Vec<CachedTemplate>, now: DateTime<Utc>) -> Vec<CachedTemplate> {
        let mut scored: Vec<(f64, CachedTemplate)> = templates
            .into_iter()
            .map(|template| (Self::score(&template, now), template))
            .collect();

        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .total_cmp(score_a)
                .then_with(|| b.downloads.cmp(&a.downloads))
                .then_with(|| b.rating.total_cmp(&a.rating))
                .then_with(|| a.id.cmp(&b.id))
        });

        scored.into_iter().map(|(_, template)| template).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn template(id: &str, downloads: u64, rating: f64, views: u64) -> CachedTemplate {
        CachedTemplate {
            id: id.to_string(),
            slug: format!("slug-{}", id),
            title: format!("模板{}", id),
            description: String::new(),
            author_id: "author".to_string(),
            category_id: "cat".to_string(),
            downloads,
            rating,
            review_count: 0,
            views,
            featured: false,
            created_at: Utc::now() - Duration::days(90),
        }
    }

    #[test]
    fn engagement_signals_raise_score() {
        let now = Utc::now();
        let weak = template("a", 1, 1.0, 10);
        let strong = template("b", 100, 4.8, 5000);

        assert!(PopularityScorer::score(&strong, now) > PopularityScorer::score(&weak, now));
    }

    #[test]
    fn featured_boost_applies() {
        let now = Utc::now();
        let plain = template("a", 10, 3.0, 100);
        let mut featured = template("b", 10, 3.0, 100);
        featured.featured = true;

        let diff = PopularityScorer::score(&featured, now) - PopularityScorer::score(&plain, now);
        assert!((diff - popularity::FEATURED_BOOST).abs() < 1e-9);
    }

    #[test]
    fn recent_templates_get_recency_bonus() {
        let now = Utc::now();
        let mut fresh = template("a", 10, 3.0, 100);
        fresh.created_at = now - Duration::days(1);
        let old = template("b", 10, 3.0, 100);

        assert!(PopularityScorer::score(&fresh, now) > PopularityScorer::score(&old, now));
    }

    #[test]
    fn rank_orders_by_score_then_tiebreaks() {
        let now = Utc::now();
        // 相同分数结构，靠下载量、评分、id逐级决出
        let a = template("a", 10, 3.0, 0);
        let b = template("b", 20, 3.0, 0);
        let mut c = template("c", 20, 3.0, 0);
        c.rating = 4.0;

        let ranked = PopularityScorer::rank(vec![a, b, c], now);
        let ids: Vec<&str> = ranked.iter().map(|t| t.id.as_str()).collect();
        // c分数最高（评分更高），b与a分数不同（下载量权重）
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn rank_is_total_and_deterministic() {
        let now = Utc::now();
        // 除id外完全相同的条目也必须有稳定的全序
        let items: Vec<CachedTemplate> = ["x", "m", "a", "q"]
            .iter()
            .map(|id| template(id, 5, 2.5, 50))
            .collect();

        let first = PopularityScorer::rank(items.clone(), now);
        let second = PopularityScorer::rank(items.into_iter().rev().collect(), now);

        let first_ids: Vec<&str> = first.iter().map(|t| t.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(first_ids, second_ids, "输入顺序不得影响输出顺序");
        assert_eq!(first_ids, vec!["a", "m", "q", "x"], "同分条目按id定序");
    }
}
