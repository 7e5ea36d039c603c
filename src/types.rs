//! Shared types for the integrity engine.
//!
//! Input snapshots (market + news), the per-detector result records that
//! make up an `AnalysisResult`, and the error taxonomy. Everything here is
//! a plain value type so detectors, scorers and the orchestrator can depend
//! on it without circular references.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// Time window
// ---------------------------------------------------------------------------

/// Inclusive time window `[start, end]` a snapshot was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window of `hours` ending at `end`.
    pub fn trailing_hours(end: DateTime<Utc>, hours: u32) -> Self {
        Self {
            start: end - Duration::hours(i64::from(hours)),
            end,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} → {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M"),
        )
    }
}

// ---------------------------------------------------------------------------
// Market snapshot
// ---------------------------------------------------------------------------

/// Trade direction from the wallet's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn opposite(&self) -> Self {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for TradeSide {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" | "bid" => Ok(TradeSide::Buy),
            "sell" | "ask" => Ok(TradeSide::Sell),
            _ => Err(IntegrityError::InvalidSnapshot {
                field: "trades.side".into(),
                reason: format!("unknown trade side: {s}"),
            }),
        }
    }
}

/// A single fill attributed to one wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub wallet_id: String,
    pub side: TradeSide,
    /// Outcome shares filled.
    pub size: f64,
    /// Fill price (0.0–1.0).
    pub price: f64,
}

impl Trade {
    /// USD notional of the fill.
    pub fn notional(&self) -> f64 {
        self.size * self.price
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:.2} @ {:.1}¢ ({})",
            self.wallet_id,
            self.side,
            self.size,
            self.price * 100.0,
            self.timestamp.format("%H:%M:%S"),
        )
    }
}

/// Traded volume for one interval, keyed by the interval start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumePoint {
    pub timestamp: DateTime<Utc>,
    pub volume: f64,
}

/// YES price observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// A price move located in a snapshot's price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceMove {
    /// Timestamp of the observation that completed the move.
    pub at: DateTime<Utc>,
    /// Signed change in percentage points (0.08 → 0.16 is +8.0).
    pub change_pct_points: f64,
}

/// Normalised market data consumed by every detector.
///
/// Providers build one per request; call [`MarketSnapshot::validated`]
/// before handing it to detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market_id: String,
    #[serde(default)]
    pub question: Option<String>,
    pub price_yes: f64,
    pub price_no: f64,
    /// Prices of any further outcomes in multi-outcome markets.
    #[serde(default)]
    pub extra_outcome_prices: Vec<f64>,
    pub window: TimeWindow,
    pub volume_series: Vec<VolumePoint>,
    #[serde(default)]
    pub price_series: Vec<PricePoint>,
    pub trades: Vec<Trade>,
    /// Liquidity on a 0–10 scale.
    pub liquidity_score: f64,
}

impl fmt::Display for MarketSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] YES {:.0}¢ | NO {:.0}¢ | {} volume pts | {} trades | liq {:.1}/10 | {}",
            self.market_id,
            self.price_yes * 100.0,
            self.price_no * 100.0,
            self.volume_series.len(),
            self.trades.len(),
            self.liquidity_score,
            self.window,
        )
    }
}

impl MarketSnapshot {
    /// Check the snapshot invariants and return it with trades sorted by time.
    pub fn validated(mut self) -> Result<Self, IntegrityError> {
        if self.market_id.trim().is_empty() {
            return Err(invalid("market_id", "empty market id"));
        }
        if self.window.start > self.window.end {
            return Err(invalid("window", "start is after end"));
        }

        let prices = [self.price_yes, self.price_no]
            .into_iter()
            .chain(self.extra_outcome_prices.iter().copied());
        for p in prices {
            if !is_probability(p) {
                return Err(invalid("price", format!("{p} is outside [0, 1]")));
            }
        }

        if !(0.0..=10.0).contains(&self.liquidity_score) {
            return Err(invalid(
                "liquidity_score",
                format!("{} is outside [0, 10]", self.liquidity_score),
            ));
        }

        for pair in self.volume_series.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(invalid(
                    "volume_series",
                    format!("timestamps not strictly increasing at {}", pair[1].timestamp),
                ));
            }
        }
        if let Some(p) = self.volume_series.iter().find(|p| !(p.volume >= 0.0)) {
            return Err(invalid(
                "volume_series",
                format!("negative or NaN volume at {}", p.timestamp),
            ));
        }

        for pair in self.price_series.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(invalid(
                    "price_series",
                    format!("timestamps not strictly increasing at {}", pair[1].timestamp),
                ));
            }
        }
        if let Some(p) = self.price_series.iter().find(|p| !is_probability(p.price)) {
            return Err(invalid("price_series", format!("price {} outside [0, 1]", p.price)));
        }

        for t in &self.trades {
            if !self.window.contains(t.timestamp) {
                return Err(invalid(
                    "trades",
                    format!("trade at {} outside window {}", t.timestamp, self.window),
                ));
            }
            if !(t.size >= 0.0) || !is_probability(t.price) {
                return Err(invalid(
                    "trades",
                    format!("bad size/price on trade by {}", t.wallet_id),
                ));
            }
        }

        self.trades.sort_by_key(|t| t.timestamp);
        Ok(self)
    }

    /// Most recent volume observation.
    pub fn latest_volume(&self) -> Option<&VolumePoint> {
        self.volume_series.last()
    }

    /// Total traded volume across the series.
    pub fn total_volume(&self) -> f64 {
        self.volume_series.iter().map(|p| p.volume).sum()
    }

    /// Price observations: the price series, or trade prices when the
    /// series has fewer than two points.
    fn price_points(&self) -> Vec<PricePoint> {
        if self.price_series.len() >= 2 {
            self.price_series.clone()
        } else {
            self.trades
                .iter()
                .map(|t| PricePoint { timestamp: t.timestamp, price: t.price })
                .collect()
        }
    }

    /// Change in percentage points between the last observation at or
    /// before `at - span` (or the first observation) and the last one at
    /// or before `at`.
    pub fn price_change_at(&self, at: DateTime<Utc>, span: Duration) -> Option<f64> {
        let points = self.price_points();
        let last_before = |t: DateTime<Utc>| points.iter().rev().find(|p| p.timestamp <= t);
        let from = last_before(at - span).or_else(|| points.first())?;
        let to = last_before(at)?;
        Some((to.price - from.price) * 100.0)
    }

    /// The largest single-interval move in the price series, falling back
    /// to consecutive trade prices when no series is present.
    pub fn largest_price_move(&self) -> Option<PriceMove> {
        self.price_points()
            .windows(2)
            .map(|w| PriceMove {
                at: w[1].timestamp,
                change_pct_points: (w[1].price - w[0].price) * 100.0,
            })
            .max_by(|a, b| {
                a.change_pct_points
                    .abs()
                    .partial_cmp(&b.change_pct_points.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Helper to build a test/sample snapshot with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        let end = Utc::now();
        let window = TimeWindow::trailing_hours(end, 24);
        let volume_series = (0..24)
            .map(|h| VolumePoint {
                timestamp: window.start + Duration::hours(h),
                volume: if h % 2 == 0 { 90.0 } else { 110.0 },
            })
            .collect();
        MarketSnapshot {
            market_id: "sample-market".to_string(),
            question: Some("Will the sample resolve YES?".to_string()),
            price_yes: 0.62,
            price_no: 0.40,
            extra_outcome_prices: Vec::new(),
            window,
            volume_series,
            price_series: Vec::new(),
            trades: Vec::new(),
            liquidity_score: 7.5,
        }
    }
}

fn is_probability(p: f64) -> bool {
    (0.0..=1.0).contains(&p)
}

fn invalid(field: &str, reason: impl Into<String>) -> IntegrityError {
    IntegrityError::InvalidSnapshot {
        field: field.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// News snapshot
// ---------------------------------------------------------------------------

fn default_weight() -> f64 {
    1.0
}

/// A news article with a pre-computed sentiment score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    /// -1.0 (very negative) to +1.0 (very positive)
    pub sentiment_score: f64,
    /// Relative weight of the article in aggregate sentiment.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl fmt::Display for Article {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}, sentiment {:+.2})",
            self.source,
            self.title,
            self.published_at.format("%Y-%m-%d %H:%M"),
            self.sentiment_score,
        )
    }
}

/// News coverage for a topic over a lookback window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSnapshot {
    pub topic: String,
    pub window: TimeWindow,
    pub articles: Vec<Article>,
}

/// Same-source duplicates published within this span collapse into one.
pub const DUPLICATE_ARTICLE_SPAN_SECS: i64 = 60;

impl NewsSnapshot {
    /// Build a snapshot, dropping out-of-window articles and same-source
    /// duplicates. Articles come back sorted by publication time.
    pub fn new(topic: impl Into<String>, window: TimeWindow, articles: Vec<Article>) -> Self {
        let mut articles: Vec<Article> = articles
            .into_iter()
            .filter(|a| window.contains(a.published_at))
            .map(|mut a| {
                a.sentiment_score = if a.sentiment_score.is_finite() {
                    a.sentiment_score.clamp(-1.0, 1.0)
                } else {
                    0.0
                };
                if !(a.weight > 0.0) {
                    a.weight = default_weight();
                }
                a
            })
            .collect();
        articles.sort_by_key(|a| a.published_at);

        // Last kept publication time per (source, title).
        let mut last_kept: HashMap<(String, String), DateTime<Utc>> = HashMap::new();
        let span = Duration::seconds(DUPLICATE_ARTICLE_SPAN_SECS);
        articles.retain(|a| {
            let key = (a.source.to_lowercase(), a.title.trim().to_lowercase());
            match last_kept.get(&key) {
                Some(prev) if a.published_at - *prev <= span => false,
                _ => {
                    last_kept.insert(key, a.published_at);
                    true
                }
            }
        });

        Self {
            topic: topic.into(),
            window,
            articles,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }
}

// ---------------------------------------------------------------------------
// Detector results
// ---------------------------------------------------------------------------

/// Volume anomaly severity, ordered from benign to severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Moderate,
    High,
}

impl Severity {
    /// Map an absolute z-score onto the severity bands.
    pub fn from_z(z: f64) -> Self {
        let z = z.abs();
        if z >= 4.0 {
            Severity::High
        } else if z >= 3.0 {
            Severity::Moderate
        } else if z >= 2.0 {
            Severity::Low
        } else {
            Severity::None
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::None => write!(f, "none"),
            Severity::Low => write!(f, "low"),
            Severity::Moderate => write!(f, "moderate"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Output of the volume anomaly detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub z_score: f64,
    pub severity: Severity,
    pub is_anomalous: bool,
    pub latest_volume: f64,
    pub baseline_mean: f64,
    pub baseline_std: f64,
    pub baseline_points: usize,
}

impl fmt::Display for AnomalyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "z={:+.2}σ severity={} latest={:.0} baseline={:.0}±{:.0} (n={})",
            self.z_score,
            self.severity,
            self.latest_volume,
            self.baseline_mean,
            self.baseline_std,
            self.baseline_points,
        )
    }
}

/// An unordered pair of wallets. The constructor normalises the order so
/// `(a, b)` and `(b, a)` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WalletPair(String, String);

impl WalletPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            WalletPair(a, b)
        } else {
            WalletPair(b, a)
        }
    }

    pub fn first(&self) -> &str {
        &self.0
    }

    pub fn second(&self) -> &str {
        &self.1
    }

    pub fn contains(&self, wallet: &str) -> bool {
        self.0 == wallet || self.1 == wallet
    }
}

impl fmt::Display for WalletPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ↔ {}", self.0, self.1)
    }
}

/// A wallet pair flagged for suspected wash trading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousPair {
    pub pair: WalletPair,
    pub round_trips: usize,
    /// Mean relative price gap across the pair's matched fills.
    pub avg_price_gap: f64,
    pub confidence: f64,
}

/// Output of the wash-trading detector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WashTradingResult {
    /// Unique pairs, highest confidence first.
    pub suspicious_pairs: Vec<SuspiciousPair>,
    /// 0.0 when no pair crosses the thresholds.
    pub confidence: f64,
    /// Fills matched to a counterparty within the lookback.
    pub matched_fills: usize,
    /// Opposite-side fills by the same wallet inside the matching tolerances.
    pub self_trades: usize,
}

impl WashTradingResult {
    /// The flagged pairs as a set.
    pub fn pairs(&self) -> BTreeSet<WalletPair> {
        self.suspicious_pairs.iter().map(|p| p.pair.clone()).collect()
    }

    pub fn is_suspicious(&self) -> bool {
        !self.suspicious_pairs.is_empty()
    }
}

/// Output of the trader concentration analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationResult {
    /// Reported Gini, small-sample corrected unless configured otherwise.
    pub gini: f64,
    /// Textbook Gini before any correction.
    #[serde(default)]
    pub raw_gini: f64,
    /// Share of total volume (0–100) held by the largest wallet.
    pub top1_pct: f64,
    pub top5_pct: f64,
    pub top10_pct: f64,
    pub wallet_count: usize,
    pub total_volume: f64,
}

impl fmt::Display for ConcentrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gini={:.3} top1={:.1}% top5={:.1}% top10={:.1}% wallets={}",
            self.gini, self.top1_pct, self.top5_pct, self.top10_pct, self.wallet_count,
        )
    }
}

/// Output of the news/price correlation analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub correlation_score: f64,
    pub red_flags: Vec<String>,
    pub articles_in_window: usize,
    pub price_change_pct_points: f64,
}

impl CorrelationResult {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.red_flags.iter().any(|f| f == flag)
    }
}

/// Overall market risk derived from the health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn from_health(overall: u8) -> Self {
        if overall >= 70 {
            RiskLevel::Low
        } else if overall >= 40 {
            RiskLevel::Moderate
        } else {
            RiskLevel::High
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Moderate => write!(f, "MODERATE"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Composite 0–100 health score with its component breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResult {
    pub overall: u8,
    pub components: BTreeMap<String, f64>,
    pub risk_level: RiskLevel,
}

impl fmt::Display for HealthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .components
            .iter()
            .map(|(name, score)| format!("{name}={score:.0}"))
            .collect();
        write!(
            f,
            "{}/100 ({}) [{}]",
            self.overall,
            self.risk_level,
            parts.join(" "),
        )
    }
}

/// A reference case similar to the current signal vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalMatch {
    pub case_id: String,
    pub similarity: f64,
    pub market: String,
    pub pattern: String,
    pub occurred_on: NaiveDate,
    pub confirmed: bool,
}

// ---------------------------------------------------------------------------
// Analysis result
// ---------------------------------------------------------------------------

/// A signal the result does not carry, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmittedSignal {
    pub signal: String,
    pub reason: String,
}

/// The combined output contract consumed by narrative generation and the
/// dashboard. Absent signals are `None` and listed in `omitted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub request_id: uuid::Uuid,
    pub market_id: String,
    pub topic: Option<String>,
    pub analyzed_at: DateTime<Utc>,
    pub anomaly: Option<AnomalyResult>,
    pub wash_trading: WashTradingResult,
    pub concentration: Option<ConcentrationResult>,
    pub news_correlation: Option<CorrelationResult>,
    pub sentiment: Option<crate::detectors::news::SentimentSummary>,
    pub news_volume: Option<crate::detectors::news::NewsVolumeComparison>,
    pub health_score: HealthResult,
    pub historical_matches: Option<Vec<HistoricalMatch>>,
    pub omitted: Vec<OmittedSignal>,
    pub served_from_cache: bool,
}

impl AnalysisResult {
    /// Whether any signal had to be left out.
    pub fn is_partial(&self) -> bool {
        !self.omitted.is_empty()
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] health {} | wash pairs={} | omitted={}{}",
            self.market_id,
            self.health_score,
            self.wash_trading.suspicious_pairs.len(),
            self.omitted.len(),
            if self.served_from_cache { " (cached)" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures reported by market-data and news providers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited{}", .retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited {
        retry_after: Option<std::time::Duration>,
    },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Domain-specific error taxonomy for the integrity engine.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("Insufficient data for {detector}: {reason}")]
    InsufficientData { detector: String, reason: String },

    #[error("Empty dataset for {detector}")]
    EmptyDataset { detector: String },

    #[error("Upstream unavailable ({provider}): {source}")]
    UpstreamUnavailable {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("Not found ({provider}): {resource}")]
    NotFound { provider: String, resource: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid snapshot field {field}: {reason}")]
    InvalidSnapshot { field: String, reason: String },

    #[error("Analysis timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntegrityError {
    /// Wrap a provider failure, keeping `NotFound` distinct.
    pub fn from_provider(provider: &str, err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(resource) => IntegrityError::NotFound {
                provider: provider.to_string(),
                resource,
            },
            other => IntegrityError::UpstreamUnavailable {
                provider: provider.to_string(),
                source: other,
            },
        }
    }

    /// Stable snake_case name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            IntegrityError::InsufficientData { .. } => "insufficient_data",
            IntegrityError::EmptyDataset { .. } => "empty_dataset",
            IntegrityError::UpstreamUnavailable { .. } => "upstream_unavailable",
            IntegrityError::NotFound { .. } => "not_found",
            IntegrityError::Configuration(_) => "configuration",
            IntegrityError::InvalidSnapshot { .. } => "invalid_snapshot",
            IntegrityError::TimedOut(_) => "timed_out",
            IntegrityError::Cancelled => "cancelled",
            IntegrityError::Internal(_) => "internal",
        }
    }

    /// Back-off hint from a throttled provider, if any.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            IntegrityError::UpstreamUnavailable {
                source: ProviderError::RateLimited { retry_after },
                ..
            } => *retry_after,
            _ => None,
        }
    }

    /// Recoverable errors degrade a single signal instead of the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IntegrityError::InsufficientData { .. } | IntegrityError::EmptyDataset { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
