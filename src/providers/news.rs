//! NewsAPI coverage provider.
//!
//! Searches `/v2/everything` for a topic over the requested window and
//! scores each article's headline and description with a keyword
//! sentiment model.
//!
//! API: `https://newsapi.org/v2/everything`
//! Auth: `X-Api-Key` header. Free tier: 100 req/day.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::{status_error, transport_error, NewsDataProvider};
use crate::types::{Article, NewsSnapshot, ProviderError, TimeWindow};

const NEWS_API_URL: &str = "https://newsapi.org/v2";
const PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// NewsAPI response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: Option<NewsSource>,
    #[serde(default, rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsSource {
    #[serde(default)]
    name: Option<String>,
}

// ---------------------------------------------------------------------------
// Sentiment scoring
// ---------------------------------------------------------------------------

const POSITIVE_WORDS: &[&str] = &[
    "win", "success", "gain", "rise", "surge", "approve", "agree", "pass",
    "breakthrough", "progress", "strong", "boost", "improve", "record",
    "optimistic", "confident", "support", "growth", "bullish", "rally",
    "lead", "increase",
];

const NEGATIVE_WORDS: &[&str] = &[
    "lose", "loss", "fail", "drop", "fall", "crash", "reject", "oppose",
    "block", "crisis", "collapse", "weak", "decline", "worst", "threat",
    "risk", "pessimistic", "concern", "fear", "scandal", "bearish",
    "decrease",
];

/// Simple keyword-based sentiment score: -1.0 (very negative) to +1.0 (very positive).
pub fn sentiment_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let pos = words
        .iter()
        .filter(|w| POSITIVE_WORDS.iter().any(|pw| w.starts_with(pw)))
        .count() as f64;
    let neg = words
        .iter()
        .filter(|w| NEGATIVE_WORDS.iter().any(|nw| w.starts_with(nw)))
        .count() as f64;

    let denom = pos + neg;
    if denom == 0.0 {
        return 0.0;
    }
    (pos - neg) / denom
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct NewsApiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl NewsApiClient {
    pub fn new(api_key: SecretString) -> Result<Self> {
        Self::with_base_url(api_key, NEWS_API_URL)
    }

    pub fn with_base_url(api_key: SecretString, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(concat!("market-integrity/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build news HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Convert NewsAPI records into scored articles. Records without a
    /// title or a parseable timestamp are skipped.
    fn convert_articles(raw: Vec<NewsArticle>) -> Vec<Article> {
        raw.into_iter()
            .filter_map(|a| {
                let title = a.title.filter(|t| !t.trim().is_empty() && t != "[Removed]")?;
                let published_at = a
                    .published_at
                    .as_deref()
                    .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                    .map(|dt| dt.with_timezone(&Utc))?;
                let text = format!("{} {}", title, a.description.as_deref().unwrap_or(""));
                Some(Article {
                    sentiment_score: sentiment_score(&text),
                    source: a
                        .source
                        .and_then(|s| s.name)
                        .unwrap_or_else(|| "unknown".to_string()),
                    title,
                    published_at,
                    weight: 1.0,
                })
            })
            .collect()
    }
}

#[async_trait]
impl NewsDataProvider for NewsApiClient {
    async fn fetch(&self, topic: &str, window: TimeWindow) -> Result<NewsSnapshot, ProviderError> {
        let url = format!("{}/everything", self.base_url);
        let from = window.start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let to = window.end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let page_size = PAGE_SIZE.to_string();

        let resp = self
            .http
            .get(&url)
            .header("X-Api-Key", self.api_key.expose_secret())
            .query(&[
                ("q", topic),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("sortBy", "publishedAt"),
                ("language", "en"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.text().await.unwrap_or_default();
            debug!(status = %status, topic, "NewsAPI returned error");
            return Err(status_error(status, &headers, topic, &body));
        }

        let data: NewsApiResponse = resp.json().await.map_err(transport_error)?;
        if data.status != "ok" {
            return Err(ProviderError::InvalidResponse(
                data.message.unwrap_or_else(|| format!("status {}", data.status)),
            ));
        }

        let snapshot = NewsSnapshot::new(topic, window, Self::convert_articles(data.articles));
        info!(topic, articles = snapshot.len(), "Fetched news coverage");
        Ok(snapshot)
    }

    fn name(&self) -> &'static str {
        "newsapi"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
