//! Analysis orchestration.
//!
//! Fetches market and news snapshots concurrently, runs the four
//! detectors on blocking tasks over a shared snapshot, then scores health
//! and historical similarity. Upstream market failures fall back to the
//! last good snapshot within a staleness limit; everything else that can
//! degrade a single signal is recorded in `AnalysisResult::omitted`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache::SnapshotCache;
use crate::detectors::news::{NewsVolumeComparison, SentimentSummary};
use crate::detectors::{
    ConcentrationAnalyzer, ConcentrationConfig, NewsConfig, NewsCorrelationAnalyzer,
    VolumeAnomalyDetector, VolumeConfig, WashConfig, WashTradingDetector,
};
use crate::providers::{MarketDataProvider, NewsDataProvider};
use crate::scoring::{
    CaseLibrary, HealthScorer, HealthWeights, HistoricalPatternMatcher, HistoryConfig,
    PatternType, SignalVector,
};
use crate::types::{
    AnalysisResult, AnomalyResult, ConcentrationResult, CorrelationResult, HealthResult,
    HistoricalMatch, IntegrityError, MarketSnapshot, NewsSnapshot, OmittedSignal, ProviderError,
    TimeWindow, WashTradingResult,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Engine-level limits plus the per-detector thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Per upstream fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Whole request, fetches and detectors included.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Oldest cached snapshot accepted as a fallback.
    #[serde(default = "default_cache_max_stale_secs")]
    pub cache_max_stale_secs: u64,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub wash_trading: WashConfig,
    #[serde(default)]
    pub concentration: ConcentrationConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub health_weights: HealthWeights,
    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_cache_max_stale_secs() -> u64 {
    900
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            cache_max_stale_secs: default_cache_max_stale_secs(),
            volume: VolumeConfig::default(),
            wash_trading: WashConfig::default(),
            concentration: ConcentrationConfig::default(),
            news: NewsConfig::default(),
            health_weights: HealthWeights::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_max_stale(&self) -> Duration {
        Duration::seconds(self.cache_max_stale_secs as i64)
    }
}

/// Per-request knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    #[serde(default)]
    pub pattern_type: Option<String>,
    #[serde(default = "default_include_historical")]
    pub include_historical: bool,
    #[serde(default = "default_news_window_minutes")]
    pub news_window_minutes: u32,
    /// When the move under investigation happened. Defaults to the
    /// largest move in the snapshot.
    #[serde(default)]
    pub price_change_time: Option<DateTime<Utc>>,
}

fn default_lookback_hours() -> u32 {
    24
}
fn default_include_historical() -> bool {
    true
}
fn default_news_window_minutes() -> u32 {
    60
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            pattern_type: None,
            include_historical: default_include_historical(),
            news_window_minutes: default_news_window_minutes(),
            price_change_time: None,
        }
    }
}

impl AnalysisOptions {
    /// Check the options and resolve the pattern filter.
    pub fn validate(&self) -> Result<PatternType, IntegrityError> {
        if self.lookback_hours == 0 {
            return Err(IntegrityError::Configuration(
                "lookback_hours must be positive".to_string(),
            ));
        }
        if self.news_window_minutes == 0 {
            return Err(IntegrityError::Configuration(
                "news_window_minutes must be positive".to_string(),
            ));
        }
        match &self.pattern_type {
            Some(p) => p.parse(),
            None => Ok(PatternType::All),
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// The closed set of analyses callers can request by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    MarketData,
    VolumeAnomaly,
    WashTrading,
    TraderConcentration,
    NewsCorrelation,
    HealthScore,
    HistoricalPatterns,
    FullAnalysis,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::MarketData,
        Operation::VolumeAnomaly,
        Operation::WashTrading,
        Operation::TraderConcentration,
        Operation::NewsCorrelation,
        Operation::HealthScore,
        Operation::HistoricalPatterns,
        Operation::FullAnalysis,
    ];

    /// External tool name.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Operation::MarketData => "get_market_data",
            Operation::VolumeAnomaly => "analyze_volume_anomaly",
            Operation::WashTrading => "detect_wash_trading",
            Operation::TraderConcentration => "get_trader_concentration",
            Operation::NewsCorrelation => "correlate_news_to_price",
            Operation::HealthScore => "calculate_health_score",
            Operation::HistoricalPatterns => "get_historical_patterns",
            Operation::FullAnalysis => "analyze_market",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tool_name())
    }
}

impl FromStr for Operation {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.tool_name() == s.trim())
            .ok_or_else(|| IntegrityError::Configuration(format!("unknown operation: {s}")))
    }
}

/// Input shared by every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    pub market_id: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub options: AnalysisOptions,
}

/// The slice of the analysis each operation returns.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "operation", content = "output", rename_all = "snake_case")]
pub enum OperationOutput {
    MarketData(MarketSnapshot),
    VolumeAnomaly(Option<AnomalyResult>),
    WashTrading(WashTradingResult),
    TraderConcentration(Option<ConcentrationResult>),
    NewsCorrelation(Option<CorrelationResult>),
    HealthScore(HealthResult),
    HistoricalPatterns(Vec<HistoricalMatch>),
    FullAnalysis(Box<AnalysisResult>),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Outputs of the news branch of the pipeline.
type NewsSignals = (CorrelationResult, SentimentSummary, NewsVolumeComparison);

const SIGNAL_ANOMALY: &str = "anomaly";
const SIGNAL_CONCENTRATION: &str = "concentration";
const SIGNAL_NEWS_CORRELATION: &str = "news_correlation";
const SIGNAL_SENTIMENT: &str = "sentiment";
const SIGNAL_NEWS_VOLUME: &str = "news_volume";

pub struct AnalysisOrchestrator {
    market: Arc<dyn MarketDataProvider>,
    news: Option<Arc<dyn NewsDataProvider>>,
    config: AnalysisConfig,
    volume: VolumeAnomalyDetector,
    wash: WashTradingDetector,
    concentration: ConcentrationAnalyzer,
    news_analyzer: NewsCorrelationAnalyzer,
    health: HealthScorer,
    history: HistoricalPatternMatcher,
    market_cache: SnapshotCache<MarketSnapshot>,
    news_cache: SnapshotCache<NewsSnapshot>,
}

impl AnalysisOrchestrator {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        news: Option<Arc<dyn NewsDataProvider>>,
        config: AnalysisConfig,
        library: Arc<CaseLibrary>,
    ) -> Self {
        Self {
            market,
            news,
            volume: VolumeAnomalyDetector::new(config.volume.clone()),
            wash: WashTradingDetector::new(config.wash_trading.clone()),
            concentration: ConcentrationAnalyzer::new(config.concentration.clone()),
            news_analyzer: NewsCorrelationAnalyzer::new(config.news.clone()),
            health: HealthScorer::new(config.health_weights.clone()),
            history: HistoricalPatternMatcher::new(library, config.history.clone()),
            market_cache: SnapshotCache::new(),
            news_cache: SnapshotCache::new(),
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Swap in a new case library for subsequent requests.
    pub fn replace_case_library(&mut self, library: Arc<CaseLibrary>) {
        self.history.replace_library(library);
    }

    /// Drop cached snapshots too stale to ever be served.
    pub async fn evict_stale_cache(&self) -> usize {
        let max = self.config.cache_max_stale();
        self.market_cache.evict_older_than(max).await + self.news_cache.evict_older_than(max).await
    }

    /// Run the full pipeline for one market.
    pub async fn analyze(
        &self,
        market_id: &str,
        topic: Option<&str>,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult, IntegrityError> {
        self.analyze_until(market_id, topic, options, std::future::pending::<()>())
            .await
    }

    /// Like [`analyze`](Self::analyze), but gives up with `Cancelled` as
    /// soon as `cancel` completes.
    pub async fn analyze_until<C>(
        &self,
        market_id: &str,
        topic: Option<&str>,
        options: &AnalysisOptions,
        cancel: C,
    ) -> Result<AnalysisResult, IntegrityError>
    where
        C: Future<Output = ()>,
    {
        let pattern = options.validate()?;
        let request_timeout = self.config.request_timeout();

        tokio::select! {
            biased;
            _ = cancel => {
                warn!(market_id, "Analysis cancelled");
                Err(IntegrityError::Cancelled)
            }
            res = tokio::time::timeout(request_timeout, self.run_pipeline(market_id, topic, options, pattern)) => {
                match res {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(market_id, timeout_ms = request_timeout.as_millis() as u64, "Analysis timed out");
                        Err(IntegrityError::TimedOut(request_timeout))
                    }
                }
            }
        }
    }

    /// Dispatch a named operation through the pipeline.
    pub async fn run(
        &self,
        operation: Operation,
        request: &OperationRequest,
    ) -> Result<OperationOutput, IntegrityError> {
        debug!(operation = %operation, market_id = %request.market_id, "Running operation");
        let topic = request.topic.as_deref();

        if operation == Operation::MarketData {
            request.options.validate()?;
            let window = TimeWindow::trailing_hours(Utc::now(), request.options.lookback_hours);
            let fetch = self.fetch_market(&request.market_id, window);
            return match tokio::time::timeout(self.config.request_timeout(), fetch).await {
                Ok(res) => res.map(|(snap, _)| OperationOutput::MarketData(Arc::unwrap_or_clone(snap))),
                Err(_) => Err(IntegrityError::TimedOut(self.config.request_timeout())),
            };
        }

        let mut options = request.options.clone();
        if operation == Operation::HistoricalPatterns {
            options.include_historical = true;
        }
        let result = self.analyze(&request.market_id, topic, &options).await?;

        Ok(match operation {
            Operation::VolumeAnomaly => OperationOutput::VolumeAnomaly(result.anomaly),
            Operation::WashTrading => OperationOutput::WashTrading(result.wash_trading),
            Operation::TraderConcentration => OperationOutput::TraderConcentration(result.concentration),
            Operation::NewsCorrelation => OperationOutput::NewsCorrelation(result.news_correlation),
            Operation::HealthScore => OperationOutput::HealthScore(result.health_score),
            Operation::HistoricalPatterns => {
                OperationOutput::HistoricalPatterns(result.historical_matches.unwrap_or_default())
            }
            Operation::FullAnalysis | Operation::MarketData => {
                OperationOutput::FullAnalysis(Box::new(result))
            }
        })
    }

    async fn run_pipeline(
        &self,
        market_id: &str,
        topic: Option<&str>,
        options: &AnalysisOptions,
        pattern: PatternType,
    ) -> Result<AnalysisResult, IntegrityError> {
        let request_id = Uuid::new_v4();
        let analyzed_at = Utc::now();
        let window = TimeWindow::trailing_hours(analyzed_at, options.lookback_hours);
        info!(%request_id, market_id, topic = topic.unwrap_or("-"), "Starting analysis");

        let (market_res, news_res) = tokio::join!(
            self.fetch_market(market_id, window),
            self.fetch_news(topic, window)
        );
        let (market, served_from_cache) = market_res?;
        let mut omitted = Vec::new();

        // Detectors run on the blocking pool over the shared snapshot.
        let lookback = Duration::hours(i64::from(options.lookback_hours));
        let volume_task = {
            let (det, snap) = (self.volume.clone(), Arc::clone(&market));
            tokio::task::spawn_blocking(move || det.detect(&snap.volume_series, lookback))
        };
        let wash_task = {
            let (det, snap) = (self.wash.clone(), Arc::clone(&market));
            tokio::task::spawn_blocking(move || det.detect(&snap.trades, lookback))
        };
        let concentration_task = {
            let (det, snap) = (self.concentration.clone(), Arc::clone(&market));
            tokio::task::spawn_blocking(move || det.analyze(&snap.trades))
        };
        let news_task = match news_res {
            Ok(news) => {
                let (det, snap) = (self.news_analyzer.clone(), Arc::clone(&market));
                let (time, window_minutes) = (options.price_change_time, options.news_window_minutes);
                Some(tokio::task::spawn_blocking(move || {
                    news_signals(&det, &snap, &news, time, window_minutes)
                }))
            }
            Err(reason) => {
                warn!(%request_id, market_id, reason = %reason, "News signals omitted");
                for signal in [SIGNAL_NEWS_CORRELATION, SIGNAL_SENTIMENT, SIGNAL_NEWS_VOLUME] {
                    omitted.push(OmittedSignal {
                        signal: signal.to_string(),
                        reason: reason.clone(),
                    });
                }
                None
            }
        };

        let anomaly = degrade(volume_task.await.map_err(join_error)?, SIGNAL_ANOMALY, &mut omitted)?;
        let wash_trading = wash_task.await.map_err(join_error)?;
        let concentration =
            degrade(concentration_task.await.map_err(join_error)?, SIGNAL_CONCENTRATION, &mut omitted)?;
        let (news_correlation, sentiment, news_volume) = match news_task {
            Some(task) => {
                let (c, s, v) = task.await.map_err(join_error)?;
                (Some(c), Some(s), Some(v))
            }
            None => (None, None, None),
        };

        let health_score = self.health.score(
            anomaly.as_ref(),
            &wash_trading,
            concentration.as_ref(),
            news_correlation.as_ref(),
            market.liquidity_score,
        );

        let historical_matches = options.include_historical.then(|| {
            let signals = SignalVector::from_signals(
                anomaly.as_ref(),
                concentration.as_ref(),
                &wash_trading,
                news_correlation.as_ref(),
            );
            self.history.match_patterns(&signals, pattern)
        });

        let result = AnalysisResult {
            request_id,
            market_id: market_id.to_string(),
            topic: topic.map(str::to_string),
            analyzed_at,
            anomaly,
            wash_trading,
            concentration,
            news_correlation,
            sentiment,
            news_volume,
            health_score,
            historical_matches,
            omitted,
            served_from_cache,
        };

        info!(
            %request_id,
            market_id,
            health = result.health_score.overall,
            risk = %result.health_score.risk_level,
            wash_pairs = result.wash_trading.suspicious_pairs.len(),
            omitted = result.omitted.len(),
            cached = served_from_cache,
            "Analysis complete"
        );
        Ok(result)
    }

    /// Fresh snapshot, or a cached one when the provider fails for any
    /// reason other than the market not existing.
    async fn fetch_market(
        &self,
        market_id: &str,
        window: TimeWindow,
    ) -> Result<(Arc<MarketSnapshot>, bool), IntegrityError> {
        let provider = self.market.name();
        let fetched = tokio::time::timeout(self.config.fetch_timeout(), self.market.fetch(market_id, window)).await;

        let err = match fetched {
            Ok(Ok(snapshot)) => {
                let snapshot = Arc::new(snapshot.validated()?);
                self.market_cache.insert(market_id, Arc::clone(&snapshot)).await;
                return Ok((snapshot, false));
            }
            Ok(Err(ProviderError::NotFound(resource))) => {
                return Err(IntegrityError::NotFound {
                    provider: provider.to_string(),
                    resource,
                });
            }
            Ok(Err(e)) => e,
            Err(_) => ProviderError::Unavailable(format!(
                "fetch timed out after {}ms",
                self.config.fetch_timeout_ms
            )),
        };

        match self.market_cache.get_fresh(market_id, self.config.cache_max_stale()).await {
            Some((snapshot, age)) => {
                warn!(
                    market_id,
                    provider,
                    error = %err,
                    age_secs = age.num_seconds(),
                    "Market fetch failed, serving cached snapshot"
                );
                Ok((snapshot, true))
            }
            None => {
                warn!(market_id, provider, error = %err, "Market fetch failed, no usable cache");
                Err(IntegrityError::from_provider(provider, err))
            }
        }
    }

    /// News for `topic`, falling back to cache. `Err` carries the reason
    /// the news signals are omitted.
    async fn fetch_news(&self, topic: Option<&str>, window: TimeWindow) -> Result<Arc<NewsSnapshot>, String> {
        let topic = topic.ok_or_else(|| "no topic given".to_string())?;
        let provider = self
            .news
            .as_ref()
            .ok_or_else(|| "no news provider configured".to_string())?;

        let err = match tokio::time::timeout(self.config.fetch_timeout(), provider.fetch(topic, window)).await {
            Ok(Ok(snapshot)) => {
                let snapshot = Arc::new(snapshot);
                self.news_cache.insert(topic, Arc::clone(&snapshot)).await;
                return Ok(snapshot);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("fetch timed out after {}ms", self.config.fetch_timeout_ms),
        };

        match self.news_cache.get_fresh(topic, self.config.cache_max_stale()).await {
            Some((snapshot, age)) => {
                warn!(topic, error = %err, age_secs = age.num_seconds(), "News fetch failed, serving cached coverage");
                Ok(snapshot)
            }
            None => Err(format!("{} unavailable: {err}", provider.name())),
        }
    }
}

/// Correlation, sentiment and news/volume comparison for one snapshot pair.
fn news_signals(
    analyzer: &NewsCorrelationAnalyzer,
    market: &MarketSnapshot,
    news: &NewsSnapshot,
    price_change_time: Option<DateTime<Utc>>,
    window_minutes: u32,
) -> NewsSignals {
    let span = Duration::minutes(i64::from(window_minutes));
    let (at, change) = match price_change_time {
        Some(at) => (at, market.price_change_at(at, span).unwrap_or(0.0)),
        None => market
            .largest_price_move()
            .map(|m| (m.at, m.change_pct_points))
            .unwrap_or((market.window.end, 0.0)),
    };

    let correlation = analyzer.correlate(news, at, change, window_minutes);
    let sentiment = analyzer.summarize_sentiment(&news.articles);
    let volume = analyzer.compare_news_to_volume(news.len(), market.total_volume());
    (correlation, sentiment, volume)
}

/// Turn a recoverable detector failure into an omitted signal.
fn degrade<T>(
    res: Result<T, IntegrityError>,
    signal: &str,
    omitted: &mut Vec<OmittedSignal>,
) -> Result<Option<T>, IntegrityError> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_recoverable() => {
            debug!(signal, reason = %e, "Signal omitted");
            omitted.push(OmittedSignal {
                signal: signal.to_string(),
                reason: e.to_string(),
            });
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn join_error(e: JoinError) -> IntegrityError {
    IntegrityError::Internal(format!("detector task failed: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
