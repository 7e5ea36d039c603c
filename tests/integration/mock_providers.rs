//! Mock providers for integration testing.
//!
//! Deterministic `MarketDataProvider` / `NewsDataProvider` implementations
//! serving snapshots built in test code, with controllable failures and
//! latency. Everything is in-memory.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use market_integrity::providers::{MarketDataProvider, NewsDataProvider};
use market_integrity::types::*;

/// A mock market-data source.
///
/// Serves a copy of its snapshot until an error is forced.
pub struct MockMarketProvider {
    snapshot: Arc<Mutex<MarketSnapshot>>,
    /// If set, every fetch returns this error.
    force_error: Arc<Mutex<Option<ProviderError>>>,
    delay: Option<std::time::Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockMarketProvider {
    pub fn new(snapshot: MarketSnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
            force_error: Arc::new(Mutex::new(None)),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long before answering each fetch.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Handle for flipping failures after the provider has been moved
    /// into an orchestrator.
    pub fn error_switch(&self) -> Arc<Mutex<Option<ProviderError>>> {
        Arc::clone(&self.force_error)
    }

    pub fn set_error(&self, err: ProviderError) {
        *self.force_error.lock().unwrap() = Some(err);
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketProvider {
    async fn fetch(&self, market_id: &str, _window: TimeWindow) -> Result<MarketSnapshot, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.force_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut snapshot = self.snapshot.lock().unwrap().clone();
        snapshot.market_id = market_id.to_string();
        Ok(snapshot)
    }

    fn name(&self) -> &'static str {
        "mock-market"
    }
}

/// A mock news source returning a fixed article list for any topic.
pub struct MockNewsProvider {
    articles: Vec<Article>,
    force_error: Arc<Mutex<Option<ProviderError>>>,
}

impl MockNewsProvider {
    pub fn new(articles: Vec<Article>) -> Self {
        Self {
            articles,
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing(err: ProviderError) -> Self {
        let provider = Self::new(Vec::new());
        *provider.force_error.lock().unwrap() = Some(err);
        provider
    }

    pub fn error_switch(&self) -> Arc<Mutex<Option<ProviderError>>> {
        Arc::clone(&self.force_error)
    }
}

#[async_trait]
impl NewsDataProvider for MockNewsProvider {
    async fn fetch(&self, topic: &str, window: TimeWindow) -> Result<NewsSnapshot, ProviderError> {
        if let Some(err) = self.force_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(NewsSnapshot::new(topic, window, self.articles.clone()))
    }

    fn name(&self) -> &'static str {
        "mock-news"
    }
}

// ---------------------------------------------------------------------------
// Snapshot builders
// ---------------------------------------------------------------------------

/// A quiet market: hourly volume alternating 90/110, no trades, flat price.
pub fn quiet_market(end: DateTime<Utc>) -> MarketSnapshot {
    let window = TimeWindow::trailing_hours(end, 24);
    let volume_series = (0..24)
        .map(|h| VolumePoint {
            timestamp: window.start + Duration::hours(h),
            volume: if h % 2 == 0 { 90.0 } else { 110.0 },
        })
        .collect();
    MarketSnapshot {
        market_id: "quiet".to_string(),
        question: Some("Will the integration test pass?".to_string()),
        price_yes: 0.55,
        price_no: 0.45,
        extra_outcome_prices: Vec::new(),
        window,
        volume_series,
        price_series: Vec::new(),
        trades: Vec::new(),
        liquidity_score: 8.0,
    }
}

/// Baseline mean 100, σ 10, then a final hour at 145.
pub fn volume_spike_market(end: DateTime<Utc>) -> MarketSnapshot {
    let mut snap = quiet_market(end);
    snap.volume_series.push(VolumePoint {
        timestamp: snap.window.end,
        volume: 145.0,
    });
    snap
}

pub fn trade(at: DateTime<Utc>, wallet: &str, side: TradeSide, size: f64, price: f64) -> Trade {
    Trade {
        timestamp: at,
        wallet_id: wallet.to_string(),
        side,
        size,
        price,
    }
}

/// Two wallets passing the same position back and forth `round_trips`
/// times, each leg filled 10 s apart at the same price.
pub fn wash_ring_market(end: DateTime<Utc>, round_trips: i64) -> MarketSnapshot {
    let mut snap = quiet_market(end);
    let base = snap.window.end - Duration::hours(6);
    for k in 0..round_trips {
        let t = base + Duration::minutes(10 * k);
        snap.trades.push(trade(t, "0xA", TradeSide::Sell, 500.0, 0.5));
        snap.trades.push(trade(t + Duration::seconds(10), "0xB", TradeSide::Buy, 500.0, 0.5));
        let t = t + Duration::minutes(5);
        snap.trades.push(trade(t, "0xB", TradeSide::Sell, 500.0, 0.5));
        snap.trades.push(trade(t + Duration::seconds(10), "0xA", TradeSide::Buy, 500.0, 0.5));
    }
    snap
}

/// One buyer wallet per entry of `notionals`, one trade each.
pub fn wallets_market(end: DateTime<Utc>, notionals: &[f64]) -> MarketSnapshot {
    let mut snap = quiet_market(end);
    let base = snap.window.end - Duration::hours(3);
    for (i, notional) in notionals.iter().enumerate() {
        let at = base + Duration::minutes(i as i64);
        snap.trades.push(trade(at, &format!("0x{i:02}"), TradeSide::Buy, notional * 2.0, 0.5));
    }
    snap
}

/// Price series jumping from 0.40 to 0.48 half an hour before `end`.
pub fn price_jump_market(end: DateTime<Utc>) -> MarketSnapshot {
    let mut snap = quiet_market(end);
    snap.price_series = vec![
        PricePoint {
            timestamp: end - Duration::hours(3),
            price: 0.40,
        },
        PricePoint {
            timestamp: end - Duration::minutes(30),
            price: 0.48,
        },
    ];
    snap.price_yes = 0.48;
    snap.price_no = 0.52;
    snap
}

pub fn article(title: &str, published_at: DateTime<Utc>, sentiment: f64) -> Article {
    Article {
        title: title.to_string(),
        source: "Wire".to_string(),
        published_at,
        sentiment_score: sentiment,
        weight: 1.0,
    }
}
