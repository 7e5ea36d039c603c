//! Polymarket market data.
//!
//! Uses the Gamma API for the market record (prices, liquidity) and the
//! Data API for the fill history. Both are public and unauthenticated.
//!
//! Gamma API: https://gamma-api.polymarket.com
//! Data API: https://data-api.polymarket.com
//!
//! Fills are bucketed hourly from the window start into the volume and
//! price series the detectors consume.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{status_error, transport_error, MarketDataProvider};
use crate::types::{
    MarketSnapshot, PricePoint, ProviderError, Trade, TradeSide, TimeWindow, VolumePoint,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";
pub const DATA_API_URL: &str = "https://data-api.polymarket.com";
const DEFAULT_TRADE_LIMIT: u32 = 1000;

/// Liquidity (USD) that maps to the top of the 0–10 scale: 10^7.
const LIQUIDITY_LOG_CEILING: f64 = 7.0;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct GammaMarket {
    #[serde(default)]
    pub question: String,
    #[serde(default, rename = "conditionId")]
    pub condition_id: String,
    /// Outcome prices as JSON string: "[\"0.65\",\"0.35\"]"
    #[serde(default, rename = "outcomePrices")]
    pub outcome_prices: Option<String>,
    /// Gamma's `liquidity` field is a string; the numeric twin is used.
    #[serde(default, rename = "liquidityNum")]
    pub liquidity_num: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataApiTrade {
    #[serde(rename = "proxyWallet")]
    pub proxy_wallet: String,
    pub side: String,
    pub size: f64,
    pub price: f64,
    /// Unix seconds.
    pub timestamp: i64,
}

impl DataApiTrade {
    fn to_trade(&self) -> Result<Trade, ProviderError> {
        let side: TradeSide = self
            .side
            .parse()
            .map_err(|e: crate::types::IntegrityError| ProviderError::InvalidResponse(e.to_string()))?;
        let timestamp = DateTime::from_timestamp(self.timestamp, 0).ok_or_else(|| {
            ProviderError::InvalidResponse(format!("bad trade timestamp {}", self.timestamp))
        })?;
        Ok(Trade {
            timestamp,
            wallet_id: self.proxy_wallet.to_lowercase(),
            side,
            size: self.size,
            price: self.price,
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PolymarketDataClient {
    http: Client,
    gamma_url: String,
    data_url: String,
    trade_limit: u32,
}

impl PolymarketDataClient {
    pub fn new() -> Result<Self> {
        Self::with_base_urls(GAMMA_API_URL, DATA_API_URL)
    }

    pub fn with_base_urls(gamma_url: &str, data_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("market-integrity/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build Polymarket HTTP client")?;

        Ok(Self {
            http,
            gamma_url: gamma_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
            trade_limit: DEFAULT_TRADE_LIMIT,
        })
    }

    /// Look up one market by condition id.
    async fn fetch_market(&self, market_id: &str) -> Result<GammaMarket, ProviderError> {
        let url = format!("{}/markets", self.gamma_url);
        debug!(market_id, "Fetching market from Gamma API");

        let resp = self
            .http
            .get(&url)
            .query(&[("condition_ids", market_id)])
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &headers, market_id, &body));
        }

        let markets: Vec<GammaMarket> = resp.json().await.map_err(transport_error)?;
        markets
            .into_iter()
            .find(|m| m.condition_id.eq_ignore_ascii_case(market_id))
            .ok_or_else(|| ProviderError::NotFound(market_id.to_string()))
    }

    /// Most recent fills for a market, newest first.
    async fn fetch_trades(&self, market_id: &str) -> Result<Vec<DataApiTrade>, ProviderError> {
        let url = format!("{}/trades", self.data_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("market", market_id.to_string()),
                ("limit", self.trade_limit.to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &headers, market_id, &body));
        }

        resp.json().await.map_err(transport_error)
    }

    /// Assemble a validated snapshot from the raw API records.
    pub fn build_snapshot(
        market: &GammaMarket,
        raw_trades: &[DataApiTrade],
        window: TimeWindow,
    ) -> Result<MarketSnapshot, ProviderError> {
        let prices = Self::parse_outcome_prices(market.outcome_prices.as_deref().unwrap_or(""))
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!(
                    "unparseable outcome prices for {}",
                    market.condition_id
                ))
            })?;
        let (price_yes, price_no) = (prices[0], prices[1]);

        let mut trades = Vec::with_capacity(raw_trades.len());
        for raw in raw_trades {
            let t = raw.to_trade()?;
            if window.contains(t.timestamp) {
                trades.push(t);
            }
        }
        trades.sort_by_key(|t| t.timestamp);

        let (volume_series, price_series) = Self::hourly_series(&trades, window);
        let liquidity = market.liquidity_num.unwrap_or(0.0);

        let snapshot = MarketSnapshot {
            market_id: market.condition_id.clone(),
            question: (!market.question.is_empty()).then(|| market.question.clone()),
            price_yes,
            price_no,
            extra_outcome_prices: prices[2..].to_vec(),
            window,
            volume_series,
            price_series,
            trades,
            liquidity_score: Self::liquidity_score(liquidity),
        };
        snapshot
            .validated()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    /// Parse outcome prices from Gamma's string format.
    /// Handles: "[\"0.65\",\"0.35\"]", "0.65, 0.35", etc. Needs at least two.
    pub fn parse_outcome_prices(s: &str) -> Option<Vec<f64>> {
        let cleaned = s.replace(['[', ']', '"', '\\'], "");
        let prices: Vec<f64> = cleaned
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        (prices.len() >= 2).then_some(prices)
    }

    /// Log-scale USD liquidity onto 0–10.
    pub fn liquidity_score(liquidity_usd: f64) -> f64 {
        if !(liquidity_usd > 0.0) {
            return 0.0;
        }
        (10.0 * (1.0 + liquidity_usd).log10() / LIQUIDITY_LOG_CEILING).clamp(0.0, 10.0)
    }

    /// Hourly notional per bucket (every bucket, zeros included) and the
    /// last fill price of each bucket that traded.
    fn hourly_series(trades: &[Trade], window: TimeWindow) -> (Vec<VolumePoint>, Vec<PricePoint>) {
        let hours = (window.duration().num_seconds().max(0) + 3599) / 3600;
        let buckets = hours.max(1) as usize;
        let mut volume = vec![0.0; buckets];
        let mut last_price: Vec<Option<f64>> = vec![None; buckets];

        for t in trades {
            let idx = ((t.timestamp - window.start).num_seconds() / 3600) as usize;
            let idx = idx.min(buckets - 1);
            volume[idx] += t.notional();
            last_price[idx] = Some(t.price);
        }

        let bucket_start = |i: usize| window.start + Duration::hours(i as i64);
        let volume_series = volume
            .into_iter()
            .enumerate()
            .map(|(i, v)| VolumePoint { timestamp: bucket_start(i), volume: v })
            .collect();
        let price_series = last_price
            .into_iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|price| PricePoint { timestamp: bucket_start(i), price }))
            .collect();
        (volume_series, price_series)
    }
}

// ---------------------------------------------------------------------------
// MarketDataProvider trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketDataProvider for PolymarketDataClient {
    async fn fetch(&self, market_id: &str, window: TimeWindow) -> Result<MarketSnapshot, ProviderError> {
        let (market, trades) = tokio::join!(self.fetch_market(market_id), self.fetch_trades(market_id));
        let (market, trades) = (market?, trades?);
        let snapshot = Self::build_snapshot(&market, &trades, window)?;
        info!(
            market_id,
            trades = snapshot.trades.len(),
            liquidity = format!("{:.1}", snapshot.liquidity_score),
            "Fetched Polymarket snapshot"
        );
        Ok(snapshot)
    }

    fn name(&self) -> &'static str {
        "polymarket"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
