//! Full-pipeline scenarios: detectors, scoring and degradation driven
//! through `AnalysisOrchestrator` with deterministic providers.

use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use market_integrity::engine::{
    AnalysisConfig, AnalysisOptions, AnalysisOrchestrator, Operation, OperationOutput,
    OperationRequest,
};
use market_integrity::providers::NewsDataProvider;
use market_integrity::scoring::{CaseLibrary, ManipulationReport, ReportFlag};
use market_integrity::types::*;

use crate::mock_providers::*;

fn orchestrator(market: MockMarketProvider, news: Option<MockNewsProvider>) -> AnalysisOrchestrator {
    orchestrator_with(market, news, AnalysisConfig::default())
}

fn orchestrator_with(
    market: MockMarketProvider,
    news: Option<MockNewsProvider>,
    config: AnalysisConfig,
) -> AnalysisOrchestrator {
    let news = news.map(|n| Arc::new(n) as Arc<dyn NewsDataProvider>);
    AnalysisOrchestrator::new(Arc::new(market), news, config, CaseLibrary::builtin().unwrap())
}

#[tokio::test]
async fn test_volume_spike_scenario() {
    let orc = orchestrator(MockMarketProvider::new(volume_spike_market(Utc::now())), None);
    let result = assert_ok!(orc.analyze("spike", None, &AnalysisOptions::default()).await);

    let anomaly = result.anomaly.as_ref().expect("anomaly present");
    assert!((anomaly.z_score - 4.5).abs() < 1e-9);
    assert_eq!(anomaly.severity, Severity::High);
    assert!(anomaly.is_anomalous);
    assert_eq!(anomaly.baseline_points, 24);

    let report = ManipulationReport::from_analysis(&result);
    assert!(report.has_flag(ReportFlag::VolumeSpike));
    assert!(report.has_flag(ReportFlag::HighVolumeAnomaly));
    assert_eq!(report.risk_score, 100 - result.health_score.overall);
}

#[tokio::test]
async fn test_wash_ring_scenario() {
    let orc = orchestrator(MockMarketProvider::new(wash_ring_market(Utc::now(), 3)), None);
    let result = assert_ok!(orc.analyze("ring", None, &AnalysisOptions::default()).await);

    assert_eq!(result.wash_trading.suspicious_pairs.len(), 1);
    let pair = &result.wash_trading.suspicious_pairs[0];
    assert_eq!(pair.pair, WalletPair::new("0xA", "0xB"));
    assert_eq!(pair.round_trips, 3);
    assert!((result.wash_trading.confidence - 0.3).abs() < 1e-9);

    // Two wallets with equal volume: no concentration penalty.
    let concentration = result.concentration.as_ref().unwrap();
    assert_eq!(concentration.wallet_count, 2);
    assert!(concentration.gini.abs() < 1e-9);

    let report = ManipulationReport::from_analysis(&result);
    assert!(report.has_flag(ReportFlag::WashTradingDetected));
    assert!(!report.has_flag(ReportFlag::HighWashTradingRisk));
}

#[tokio::test]
async fn test_more_round_trips_raise_confidence() {
    let few = orchestrator(MockMarketProvider::new(wash_ring_market(Utc::now(), 4)), None);
    let many = orchestrator(MockMarketProvider::new(wash_ring_market(Utc::now(), 9)), None);
    let opts = AnalysisOptions::default();

    let few = few.analyze("ring", None, &opts).await.unwrap();
    let many = many.analyze("ring", None, &opts).await.unwrap();
    assert!(many.wash_trading.confidence >= few.wash_trading.confidence);
    assert!(many.health_score.components["wash_trading"] <= few.health_score.components["wash_trading"]);
}

#[tokio::test]
async fn test_even_wallets_scenario() {
    let market = wallets_market(Utc::now(), &[100.0; 10]);
    let orc = orchestrator(MockMarketProvider::new(market), None);
    let result = orc.analyze("even", None, &AnalysisOptions::default()).await.unwrap();

    let c = result.concentration.unwrap();
    assert!(c.gini.abs() < 1e-9);
    assert!((c.top1_pct - 10.0).abs() < 1e-9);
    assert!((c.top5_pct - 50.0).abs() < 1e-9);
    assert!((result.health_score.components["concentration"] - 100.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_dominant_wallet_scenario() {
    let mut notionals = vec![1.0; 9];
    notionals.push(991.0);
    let orc = orchestrator(MockMarketProvider::new(wallets_market(Utc::now(), &notionals)), None);
    let result = orc.analyze("whale", None, &AnalysisOptions::default()).await.unwrap();

    let c = result.concentration.as_ref().unwrap();
    assert!(c.gini > 0.9, "gini {}", c.gini);
    assert!((c.top1_pct - 99.1).abs() < 1e-9);

    let report = ManipulationReport::from_analysis(&result);
    assert!(report.has_flag(ReportFlag::HighTraderConcentration));
}

#[tokio::test]
async fn test_price_move_without_news_scenario() {
    let orc = orchestrator(
        MockMarketProvider::new(price_jump_market(Utc::now())),
        Some(MockNewsProvider::new(Vec::new())),
    );
    let result = orc
        .analyze("jump", Some("senate vote"), &AnalysisOptions::default())
        .await
        .unwrap();

    let news = result.news_correlation.as_ref().expect("news correlation present");
    assert!(news.has_flag("price_move_without_news"));
    assert!(news.has_flag("insufficient_news_volume"));
    assert_eq!(news.articles_in_window, 0);
    assert!(!result.is_partial());

    let report = ManipulationReport::from_analysis(&result);
    assert!(report.has_flag(ReportFlag::NewsMismatch));
}

#[tokio::test]
async fn test_move_explained_by_news() {
    let now = Utc::now();
    let articles = vec![
        article("Bill gains support in strong vote", now - chrono::Duration::minutes(50), 0.6),
        article("Leaders confident of passage", now - chrono::Duration::minutes(40), 0.5),
        article("Analysts see progress", now - chrono::Duration::minutes(35), 0.4),
    ];
    let orc = orchestrator(
        MockMarketProvider::new(price_jump_market(now)),
        Some(MockNewsProvider::new(articles)),
    );
    let result = orc.analyze("jump", Some("senate vote"), &AnalysisOptions::default()).await.unwrap();

    let news = result.news_correlation.as_ref().unwrap();
    assert!(news.red_flags.is_empty(), "flags {:?}", news.red_flags);
    assert!((news.correlation_score - 0.5).abs() < 1e-9);
    assert_eq!(result.sentiment.as_ref().unwrap().overall, "POSITIVE");
}

#[tokio::test]
async fn test_explicit_price_change_time() {
    let now = Utc::now();
    let orc = orchestrator(
        MockMarketProvider::new(price_jump_market(now)),
        Some(MockNewsProvider::new(Vec::new())),
    );
    // Four hours back, the price had not moved yet.
    let opts = AnalysisOptions {
        price_change_time: Some(now - chrono::Duration::hours(4)),
        ..AnalysisOptions::default()
    };
    let result = orc.analyze("jump", Some("senate vote"), &opts).await.unwrap();
    let news = result.news_correlation.unwrap();
    assert!(!news.has_flag("price_move_without_news"));
}

#[tokio::test]
async fn test_rate_limited_scenario() {
    let market = MockMarketProvider::new(quiet_market(Utc::now()));
    market.set_error(ProviderError::RateLimited {
        retry_after: Some(Duration::from_secs(30)),
    });
    let orc = orchestrator(market, None);

    let err = assert_err!(orc.analyze("m", None, &AnalysisOptions::default()).await);
    assert_eq!(err.kind(), "upstream_unavailable");
    assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    assert!(matches!(
        err,
        IntegrityError::UpstreamUnavailable { ref provider, .. } if provider == "mock-market"
    ));
}

#[tokio::test]
async fn test_rate_limit_served_from_cache() {
    let market = MockMarketProvider::new(wash_ring_market(Utc::now(), 3));
    let switch = market.error_switch();
    let calls = market.call_counter();
    let orc = orchestrator(market, None);
    let opts = AnalysisOptions::default();

    let fresh = orc.analyze("m", None, &opts).await.unwrap();
    *switch.lock().unwrap() = Some(ProviderError::RateLimited { retry_after: None });
    let cached = orc.analyze("m", None, &opts).await.unwrap();

    assert!(cached.served_from_cache);
    assert_eq!(cached.wash_trading, fresh.wash_trading);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // A different market has nothing cached.
    assert_err!(orc.analyze("other", None, &opts).await);
}

#[tokio::test]
async fn test_stale_cache_not_served() {
    let market = MockMarketProvider::new(quiet_market(Utc::now()));
    let switch = market.error_switch();
    let config = AnalysisConfig {
        cache_max_stale_secs: 0,
        ..AnalysisConfig::default()
    };
    let orc = orchestrator_with(market, None, config);
    let opts = AnalysisOptions::default();

    orc.analyze("m", None, &opts).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    *switch.lock().unwrap() = Some(ProviderError::Unavailable("502".into()));
    let err = orc.analyze("m", None, &opts).await.unwrap_err();
    assert_eq!(err.kind(), "upstream_unavailable");
    assert_eq!(orc.evict_stale_cache().await, 1);
}

#[tokio::test]
async fn test_not_found_skips_cache() {
    let market = MockMarketProvider::new(quiet_market(Utc::now()));
    let switch = market.error_switch();
    let orc = orchestrator(market, None);
    let opts = AnalysisOptions::default();

    orc.analyze("m", None, &opts).await.unwrap();
    *switch.lock().unwrap() = Some(ProviderError::NotFound("m".into()));
    let err = orc.analyze("m", None, &opts).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_news_outage_degrades_result() {
    let orc = orchestrator(
        MockMarketProvider::new(price_jump_market(Utc::now())),
        Some(MockNewsProvider::failing(ProviderError::RateLimited { retry_after: None })),
    );
    let result = orc.analyze("jump", Some("senate vote"), &AnalysisOptions::default()).await.unwrap();

    assert!(result.news_correlation.is_none());
    assert!(result.sentiment.is_none());
    assert!(result.news_volume.is_none());
    let omitted: Vec<&str> = result.omitted.iter().map(|o| o.signal.as_str()).collect();
    assert_eq!(omitted, ["news_correlation", "sentiment", "news_volume"]);
    assert!(!result.health_score.components.contains_key("news"));
}

#[tokio::test]
async fn test_news_outage_served_from_cache() {
    let now = Utc::now();
    let articles = vec![
        article("Bill gains support", now - chrono::Duration::minutes(50), 0.6),
        article("Leaders confident", now - chrono::Duration::minutes(40), 0.4),
    ];
    let news = MockNewsProvider::new(articles);
    let news_switch = news.error_switch();
    let config = AnalysisConfig {
        cache_max_stale_secs: 1,
        ..AnalysisConfig::default()
    };
    let orc = orchestrator_with(MockMarketProvider::new(price_jump_market(now)), Some(news), config);
    let opts = AnalysisOptions::default();

    let fresh = orc.analyze("jump", Some("senate vote"), &opts).await.unwrap();
    assert!(fresh.news_correlation.is_some());

    *news_switch.lock().unwrap() = Some(ProviderError::Unavailable("503".into()));
    let cached = orc.analyze("jump", Some("senate vote"), &opts).await.unwrap();
    assert!(cached.omitted.is_empty(), "omitted {:?}", cached.omitted);
    assert_eq!(cached.news_correlation, fresh.news_correlation);
    assert_eq!(cached.sentiment, fresh.sentiment);
    // The market fetch itself succeeded.
    assert!(!cached.served_from_cache);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(orc.evict_stale_cache().await >= 1);
    let degraded = orc.analyze("jump", Some("senate vote"), &opts).await.unwrap();
    assert!(degraded.news_correlation.is_none());
    assert_eq!(degraded.omitted.len(), 3);
}

#[tokio::test]
async fn test_request_timeout() {
    let market = MockMarketProvider::new(quiet_market(Utc::now())).with_delay(Duration::from_secs(5));
    let config = AnalysisConfig {
        request_timeout_ms: 50,
        ..AnalysisConfig::default()
    };
    let orc = orchestrator_with(market, None, config);
    let err = orc.analyze("slow", None, &AnalysisOptions::default()).await.unwrap_err();
    assert_eq!(err.kind(), "timed_out");
}

#[tokio::test]
async fn test_cancellation() {
    let market = MockMarketProvider::new(quiet_market(Utc::now())).with_delay(Duration::from_secs(5));
    let orc = orchestrator(market, None);
    let cancel = tokio::time::sleep(Duration::from_millis(20));
    let err = orc
        .analyze_until("slow", None, &AnalysisOptions::default(), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrityError::Cancelled));
}

#[tokio::test]
async fn test_operations_by_tool_name() {
    let orc = orchestrator(MockMarketProvider::new(wash_ring_market(Utc::now(), 3)), None);
    let request = OperationRequest {
        market_id: "ring".to_string(),
        topic: None,
        options: AnalysisOptions::default(),
    };

    let op: Operation = "detect_wash_trading".parse().unwrap();
    match orc.run(op, &request).await.unwrap() {
        OperationOutput::WashTrading(w) => assert!(w.is_suspicious()),
        other => panic!("unexpected output {other:?}"),
    }

    match orc.run(Operation::HealthScore, &request).await.unwrap() {
        OperationOutput::HealthScore(h) => assert!(h.overall <= 100),
        other => panic!("unexpected output {other:?}"),
    }

    let json = serde_json::to_value(orc.run(Operation::TraderConcentration, &request).await.unwrap()).unwrap();
    assert_eq!(json["operation"], "trader_concentration");
    assert_eq!(json["output"]["wallet_count"], 2);
}

#[tokio::test]
async fn test_custom_case_library() {
    let cases = r#"[{"case_id":"X-1","market":"Ring","pattern":"wash_trading","occurred_on":"2025-01-01",
        "outcome":"confirmed","details":"","confirmed_manipulation":true,"signals":[1.0,0.0,0.3,0.0]}]"#;
    let mut orc = orchestrator(MockMarketProvider::new(wash_ring_market(Utc::now(), 3)), None);
    orc.replace_case_library(Arc::new(CaseLibrary::from_json(cases).unwrap()));

    let opts = AnalysisOptions {
        pattern_type: Some("wash-trading".to_string()),
        ..AnalysisOptions::default()
    };
    let result = orc.analyze("ring", None, &opts).await.unwrap();
    let matches = result.historical_matches.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].case_id, "X-1");
    assert!(matches[0].similarity > 0.99);
}
