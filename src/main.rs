//! Market integrity watcher.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the providers and analysis engine, then analyses every market
//! on the watchlist each interval until Ctrl+C.

use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use market_integrity::config::{self, WatchedMarket};
use market_integrity::engine::{AnalysisOptions, AnalysisOrchestrator};
use market_integrity::providers::polymarket::{DATA_API_URL, GAMMA_API_URL};
use market_integrity::providers::{NewsApiClient, NewsDataProvider, PolymarketDataClient};
use market_integrity::scoring::ManipulationReport;
use market_integrity::storage;

const BANNER: &str = r#"
 ___ _   _ _____ _____ ____ ____  ___ _______   __
|_ _| \ | |_   _| ____/ ___|  _ \|_ _|_   _\ \ / /
 | ||  \| | | | |  _|| |  _| |_) || |  | |  \ V /
 | || |\  | | | | |__| |_| |  _ < | |  | |   | |
|___|_| \_| |_| |_____\____|_| \_\___| |_|   |_|

  Prediction-market manipulation watcher
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("INTEGRITY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        service = %cfg.service.name,
        interval_secs = cfg.service.interval_secs,
        markets = cfg.watchlist.len(),
        "Integrity watcher starting up"
    );

    // -- Initialise components -------------------------------------------

    let polymarket = &cfg.providers.polymarket;
    let market = Arc::new(PolymarketDataClient::with_base_urls(
        polymarket.gamma_url.as_deref().unwrap_or(GAMMA_API_URL),
        polymarket.data_url.as_deref().unwrap_or(DATA_API_URL),
    )?);

    let news = build_news_provider(&cfg)?;
    if news.is_none() {
        warn!("News provider disabled, news signals will be omitted");
    }

    let library = storage::resolve_case_library(cfg.case_library_path.as_deref())?;
    info!(cases = library.len(), "Historical case library ready");

    let orchestrator = AnalysisOrchestrator::new(market, news, cfg.analysis.clone(), library);

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.service.interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.service.interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    let mut tick: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick += 1;
                run_tick(tick, &orchestrator, &cfg.watchlist, &cfg.options).await;
                let evicted = orchestrator.evict_stale_cache().await;
                if evicted > 0 {
                    info!(evicted, "Evicted stale cached snapshots");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(ticks = tick, "Integrity watcher shut down cleanly.");
    Ok(())
}

fn build_news_provider(cfg: &config::AppConfig) -> Result<Option<Arc<dyn NewsDataProvider>>> {
    let news_cfg = &cfg.providers.news;
    if !news_cfg.enabled {
        return Ok(None);
    }
    let key = config::AppConfig::resolve_secret(&news_cfg.api_key_env)
        .context("News provider enabled but no API key")?;
    let client: Arc<dyn NewsDataProvider> = match news_cfg.base_url.as_deref() {
        Some(url) => Arc::new(NewsApiClient::with_base_url(key, url)?),
        None => Arc::new(NewsApiClient::new(key)?),
    };
    Ok(Some(client))
}

/// Analyse every watched market concurrently and log a report for each.
async fn run_tick(
    tick: u64,
    orchestrator: &AnalysisOrchestrator,
    watchlist: &[WatchedMarket],
    options: &AnalysisOptions,
) {
    info!(tick, markets = watchlist.len(), "Starting tick");

    let analyses = watchlist
        .iter()
        .map(|m| orchestrator.analyze(&m.market_id, m.topic.as_deref(), options));
    let results = join_all(analyses).await;

    let mut failed = 0usize;
    for (watched, result) in watchlist.iter().zip(results) {
        match result {
            Ok(analysis) => {
                let report = ManipulationReport::from_analysis(&analysis);
                info!(
                    market_id = %watched.market_id,
                    risk_score = report.risk_score,
                    risk = %report.risk_level,
                    flags = report.flags.len(),
                    confidence = format!("{:.2}", report.confidence),
                    partial = analysis.is_partial(),
                    cached = analysis.served_from_cache,
                    "{}",
                    report.explanation
                );
            }
            Err(e) => {
                failed += 1;
                error!(
                    market_id = %watched.market_id,
                    kind = e.kind(),
                    retry_after_secs = e.retry_after().map(|d| d.as_secs()),
                    error = %e,
                    "Analysis failed"
                );
            }
        }
    }

    info!(tick, ok = watchlist.len() - failed, failed, "Tick complete");
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_integrity=info,integrity=info"));

    let json_logging = std::env::var("INTEGRITY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
