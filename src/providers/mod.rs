//! Upstream data providers.
//!
//! Defines the `MarketDataProvider` and `NewsDataProvider` traits the
//! orchestrator fetches through, and provides implementations for:
//! - Polymarket: Gamma API market lookup + Data API trade history
//! - NewsAPI: article search with keyword sentiment scoring

pub mod news;
pub mod polymarket;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

use crate::types::{MarketSnapshot, NewsSnapshot, ProviderError, TimeWindow};

pub use news::NewsApiClient;
pub use polymarket::PolymarketDataClient;

/// Source of market snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch prices, volume history and trades for one market.
    async fn fetch(&self, market_id: &str, window: TimeWindow) -> Result<MarketSnapshot, ProviderError>;

    /// Provider name for logging and error attribution.
    fn name(&self) -> &'static str;
}

/// Source of news coverage for a topic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NewsDataProvider: Send + Sync {
    async fn fetch(&self, topic: &str, window: TimeWindow) -> Result<NewsSnapshot, ProviderError>;

    fn name(&self) -> &'static str;
}

/// Map a non-success HTTP status onto the provider error taxonomy.
pub(crate) fn status_error(status: StatusCode, headers: &HeaderMap, resource: &str, body: &str) -> ProviderError {
    match status {
        StatusCode::NOT_FOUND => ProviderError::NotFound(resource.to_string()),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(std::time::Duration::from_secs),
        },
        _ => ProviderError::Unavailable(format!("HTTP {status}: {}", truncate(body, 200))),
    }
}

/// Map a transport-level reqwest failure.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::InvalidResponse(err.to_string())
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_status_mapping() {
        let headers = HeaderMap::new();
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, &headers, "m1", ""),
            ProviderError::NotFound(r) if r == "m1"
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, &headers, "m1", "upstream down"),
            ProviderError::Unavailable(msg) if msg.contains("502")
        ));
    }

    #[test]
    fn test_rate_limit_reads_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("45"));
        match status_error(StatusCode::TOO_MANY_REQUESTS, &headers, "m1", "") {
            ProviderError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(std::time::Duration::from_secs(45)));
            }
            other => panic!("unexpected {other:?}"),
        }

        let no_hint = status_error(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), "m1", "");
        assert!(matches!(no_hint, ProviderError::RateLimited { retry_after: None }));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
