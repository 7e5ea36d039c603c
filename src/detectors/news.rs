//! News / price correlation.
//!
//! Checks whether a price move was preceded by news coverage and whether
//! that coverage's sentiment points the same way. Also carries the
//! sentiment breakdown and the news-vs-volume comparison used in reports.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Article, CorrelationResult, NewsSnapshot};

pub const FLAG_INSUFFICIENT_NEWS: &str = "insufficient_news_volume";
pub const FLAG_MOVE_WITHOUT_NEWS: &str = "price_move_without_news";
pub const FLAG_SENTIMENT_CONTRADICTS: &str = "sentiment_contradicts_move";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NewsConfig {
    /// Fewer qualifying articles than this caps the score.
    #[serde(default = "default_min_articles")]
    pub min_articles: usize,
    /// Max score magnitude when coverage is thin.
    #[serde(default = "default_thin_coverage_cap")]
    pub thin_coverage_cap: f64,
    /// Price change (percentage points) that counts as a large move.
    #[serde(default = "default_large_move_pct_points")]
    pub large_move_pct_points: f64,
    /// Expected traded USD per article of coverage.
    #[serde(default = "default_volume_per_article")]
    pub expected_volume_per_article: f64,
}

fn default_min_articles() -> usize {
    2
}
fn default_thin_coverage_cap() -> f64 {
    0.2
}
fn default_large_move_pct_points() -> f64 {
    5.0
}
fn default_volume_per_article() -> f64 {
    500_000.0
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            min_articles: default_min_articles(),
            thin_coverage_cap: default_thin_coverage_cap(),
            large_move_pct_points: default_large_move_pct_points(),
            expected_volume_per_article: default_volume_per_article(),
        }
    }
}

// ---------------------------------------------------------------------------
// Supplementary outputs
// ---------------------------------------------------------------------------

/// Positive / neutral / negative breakdown of a topic's coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    /// "POSITIVE" | "NEUTRAL" | "NEGATIVE"
    pub overall: String,
    /// (positive - negative) / total
    pub score: f64,
    pub positive_count: usize,
    pub neutral_count: usize,
    pub negative_count: usize,
    /// "HIGH" (≥10 articles) | "MEDIUM" (≥5) | "LOW"
    pub confidence: String,
}

/// Traded volume relative to how much news the topic received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsVolumeComparison {
    pub trading_volume: f64,
    pub article_count: usize,
    pub expected_articles: usize,
    pub volume_per_article: f64,
    pub multiplier: f64,
    /// Volume per article above twice the expected ratio.
    pub disproportionate: bool,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct NewsCorrelationAnalyzer {
    config: NewsConfig,
}

impl NewsCorrelationAnalyzer {
    pub fn new(config: NewsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NewsConfig {
        &self.config
    }

    /// Correlate coverage published in the `window_minutes` before
    /// `price_change_time` with a move of `price_change_pct_points`.
    pub fn correlate(
        &self,
        news: &NewsSnapshot,
        price_change_time: DateTime<Utc>,
        price_change_pct_points: f64,
        window_minutes: u32,
    ) -> CorrelationResult {
        let from = price_change_time - Duration::minutes(i64::from(window_minutes));
        let selected: Vec<&Article> = news
            .articles
            .iter()
            .filter(|a| a.published_at >= from && a.published_at <= price_change_time)
            .collect();

        let total_weight: f64 = selected.iter().map(|a| a.weight).sum();
        let mut score = if total_weight > 0.0 {
            selected
                .iter()
                .map(|a| a.weight * a.sentiment_score)
                .sum::<f64>()
                / total_weight
        } else {
            0.0
        };
        score = score.clamp(-1.0, 1.0);

        let mut red_flags = Vec::new();
        if selected.len() < self.config.min_articles {
            let cap = self.config.thin_coverage_cap;
            score = score.clamp(-cap, cap);
            red_flags.push(FLAG_INSUFFICIENT_NEWS.to_string());
        }

        let large_move = price_change_pct_points.abs() > self.config.large_move_pct_points;
        if large_move && selected.is_empty() {
            red_flags.push(FLAG_MOVE_WITHOUT_NEWS.to_string());
        }
        if large_move
            && score.abs() >= self.config.thin_coverage_cap
            && score.signum() != price_change_pct_points.signum()
        {
            red_flags.push(FLAG_SENTIMENT_CONTRADICTS.to_string());
        }

        debug!(
            topic = %news.topic,
            articles = selected.len(),
            score = format!("{score:.2}"),
            move_pp = price_change_pct_points,
            flags = ?red_flags,
            "News correlation computed"
        );

        CorrelationResult {
            correlation_score: score,
            red_flags,
            articles_in_window: selected.len(),
            price_change_pct_points,
        }
    }

    /// Bucket articles into positive / neutral / negative by sentiment.
    pub fn summarize_sentiment(&self, articles: &[Article]) -> SentimentSummary {
        let positive_count = articles.iter().filter(|a| a.sentiment_score > 0.05).count();
        let negative_count = articles.iter().filter(|a| a.sentiment_score < -0.05).count();
        let total = articles.len();
        let neutral_count = total - positive_count - negative_count;

        let score = if total > 0 {
            (positive_count as f64 - negative_count as f64) / total as f64
        } else {
            0.0
        };
        let overall = if score > 0.2 {
            "POSITIVE"
        } else if score < -0.2 {
            "NEGATIVE"
        } else {
            "NEUTRAL"
        };
        let confidence = if total >= 10 {
            "HIGH"
        } else if total >= 5 {
            "MEDIUM"
        } else {
            "LOW"
        };

        SentimentSummary {
            overall: overall.to_string(),
            score,
            positive_count,
            neutral_count,
            negative_count,
            confidence: confidence.to_string(),
        }
    }

    /// Compare traded volume with the amount of coverage it attracted.
    pub fn compare_news_to_volume(&self, article_count: usize, trading_volume: f64) -> NewsVolumeComparison {
        let expected_ratio = self.config.expected_volume_per_article;
        let volume_per_article = if article_count > 0 {
            trading_volume / article_count as f64
        } else {
            trading_volume
        };
        let expected_articles = if expected_ratio > 0.0 {
            ((trading_volume / expected_ratio) as usize).max(1)
        } else {
            1
        };
        let multiplier = if expected_ratio > 0.0 {
            volume_per_article / expected_ratio
        } else {
            0.0
        };

        NewsVolumeComparison {
            trading_volume,
            article_count,
            expected_articles,
            volume_per_article,
            multiplier,
            disproportionate: volume_per_article > expected_ratio * 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
