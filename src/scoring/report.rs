//! Manipulation report.
//!
//! Derives a deterministic flag list, risk score and one-line explanation
//! from an `AnalysisResult`. This is the structured input a narrative
//! layer turns into prose.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::detectors::news::{FLAG_MOVE_WITHOUT_NEWS, FLAG_SENTIMENT_CONTRADICTS};
use crate::types::{AnalysisResult, RiskLevel, Severity};

/// Findings a report can raise, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFlag {
    VolumeSpike,
    HighVolumeAnomaly,
    WashTradingDetected,
    HighWashTradingRisk,
    HighTraderConcentration,
    NewsMismatch,
    TradingNewsMismatch,
    SimilarToConfirmedCase,
}

impl ReportFlag {
    fn finding(&self) -> &'static str {
        match self {
            ReportFlag::VolumeSpike => "anomalous trading volume",
            ReportFlag::HighVolumeAnomaly => "a severe volume spike",
            ReportFlag::WashTradingDetected => "suspected wash trading",
            ReportFlag::HighWashTradingRisk => "a high wash-trading risk",
            ReportFlag::HighTraderConcentration => "volume concentrated in few wallets",
            ReportFlag::NewsMismatch => "price action unsupported by news",
            ReportFlag::TradingNewsMismatch => "trading volume out of proportion to coverage",
            ReportFlag::SimilarToConfirmedCase => "a close match to a confirmed manipulation case",
        }
    }
}

impl fmt::Display for ReportFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportFlag::VolumeSpike => "volume_spike",
            ReportFlag::HighVolumeAnomaly => "high_volume_anomaly",
            ReportFlag::WashTradingDetected => "wash_trading_detected",
            ReportFlag::HighWashTradingRisk => "high_wash_trading_risk",
            ReportFlag::HighTraderConcentration => "high_trader_concentration",
            ReportFlag::NewsMismatch => "news_mismatch",
            ReportFlag::TradingNewsMismatch => "trading_news_mismatch",
            ReportFlag::SimilarToConfirmedCase => "similar_to_confirmed_case",
        };
        write!(f, "{s}")
    }
}

const HIGH_WASH_PAIR_COUNT: usize = 3;
const HIGH_WASH_CONFIDENCE: f64 = 0.7;
const HIGH_GINI: f64 = 0.6;
const HIGH_TOP5_PCT: f64 = 50.0;
const CONFIRMED_CASE_SIMILARITY: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManipulationReport {
    pub market_id: String,
    /// 100 - health score.
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub flags: Vec<ReportFlag>,
    pub confidence: f64,
    pub explanation: String,
}

impl ManipulationReport {
    pub fn from_analysis(result: &AnalysisResult) -> Self {
        let mut flags = Vec::new();

        if let Some(a) = &result.anomaly {
            if a.is_anomalous {
                flags.push(ReportFlag::VolumeSpike);
            }
            if a.severity == Severity::High {
                flags.push(ReportFlag::HighVolumeAnomaly);
            }
        }

        let wash = &result.wash_trading;
        if wash.is_suspicious() {
            flags.push(ReportFlag::WashTradingDetected);
        }
        if wash.suspicious_pairs.len() > HIGH_WASH_PAIR_COUNT || wash.confidence >= HIGH_WASH_CONFIDENCE {
            flags.push(ReportFlag::HighWashTradingRisk);
        }

        if let Some(c) = &result.concentration {
            if c.gini >= HIGH_GINI || c.top5_pct >= HIGH_TOP5_PCT {
                flags.push(ReportFlag::HighTraderConcentration);
            }
        }

        if let Some(n) = &result.news_correlation {
            if n.has_flag(FLAG_MOVE_WITHOUT_NEWS) || n.has_flag(FLAG_SENTIMENT_CONTRADICTS) {
                flags.push(ReportFlag::NewsMismatch);
            }
        }
        if result.news_volume.as_ref().is_some_and(|v| v.disproportionate) {
            flags.push(ReportFlag::TradingNewsMismatch);
        }

        let top_confirmed = result
            .historical_matches
            .as_ref()
            .and_then(|m| m.first())
            .is_some_and(|m| m.confirmed && m.similarity >= CONFIRMED_CASE_SIMILARITY);
        if top_confirmed {
            flags.push(ReportFlag::SimilarToConfirmedCase);
        }

        let core_present = result.anomaly.is_some() && result.concentration.is_some();
        let mut confidence = 0.7;
        if core_present {
            confidence += 0.15;
        }
        confidence += (0.03 * flags.len() as f64).min(0.15);
        let confidence = confidence.min(1.0);

        let explanation = explain(&result.market_id, &flags, result.health_score.risk_level);

        Self {
            market_id: result.market_id.clone(),
            risk_score: 100u8.saturating_sub(result.health_score.overall),
            risk_level: result.health_score.risk_level,
            flags,
            confidence,
            explanation,
        }
    }

    pub fn has_flag(&self, flag: ReportFlag) -> bool {
        self.flags.contains(&flag)
    }
}

fn explain(market_id: &str, flags: &[ReportFlag], risk: RiskLevel) -> String {
    let findings: Vec<&str> = flags.iter().map(ReportFlag::finding).collect();
    match findings.as_slice() {
        [] => format!("Market {market_id} shows no manipulation indicators ({risk} risk)."),
        [one] => format!("Market {market_id} shows {one} ({risk} risk)."),
        [init @ .., last] => format!(
            "Market {market_id} shows {} and {last} ({risk} risk).",
            init.join(", ")
        ),
    }
}

impl fmt::Display for ManipulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<String> = self.flags.iter().map(|fl| fl.to_string()).collect();
        write!(
            f,
            "[{}] risk {}/100 ({}) confidence {:.0}% flags=[{}]",
            self.market_id,
            self.risk_score,
            self.risk_level,
            self.confidence * 100.0,
            flags.join(", "),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
