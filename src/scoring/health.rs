//! Composite market health score.
//!
//! Each available signal is mapped onto a 0–100 component (higher is
//! healthier) and the components are combined with configurable weights.
//! Missing signals drop out and the remaining weights are renormalised.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::types::{
    AnomalyResult, ConcentrationResult, CorrelationResult, HealthResult, RiskLevel, Severity,
    WashTradingResult,
};

pub const COMPONENT_LIQUIDITY: &str = "liquidity";
pub const COMPONENT_ANOMALY: &str = "anomaly";
pub const COMPONENT_CONCENTRATION: &str = "concentration";
pub const COMPONENT_WASH: &str = "wash_trading";
pub const COMPONENT_NEWS: &str = "news";

/// Points deducted from the news component per red flag.
const NEWS_FLAG_PENALTY: f64 = 30.0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Relative component weights. They need not sum to 1.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthWeights {
    #[serde(default = "default_core_weight")]
    pub liquidity: f64,
    #[serde(default = "default_core_weight")]
    pub anomaly: f64,
    #[serde(default = "default_core_weight")]
    pub concentration: f64,
    #[serde(default = "default_core_weight")]
    pub wash_trading: f64,
    /// Off by default; set above zero to fold news red flags into the score.
    #[serde(default)]
    pub news: f64,
}

fn default_core_weight() -> f64 {
    0.25
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            liquidity: default_core_weight(),
            anomaly: default_core_weight(),
            concentration: default_core_weight(),
            wash_trading: default_core_weight(),
            news: 0.0,
        }
    }
}

impl HealthWeights {
    fn weight_for(&self, component: &str) -> f64 {
        match component {
            COMPONENT_LIQUIDITY => self.liquidity,
            COMPONENT_ANOMALY => self.anomaly,
            COMPONENT_CONCENTRATION => self.concentration,
            COMPONENT_WASH => self.wash_trading,
            COMPONENT_NEWS => self.news,
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct HealthScorer {
    weights: HealthWeights,
}

impl HealthScorer {
    pub fn new(weights: HealthWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &HealthWeights {
        &self.weights
    }

    /// Combine whatever signals are present into a health score.
    pub fn score(
        &self,
        anomaly: Option<&AnomalyResult>,
        wash_trading: &WashTradingResult,
        concentration: Option<&ConcentrationResult>,
        news_correlation: Option<&CorrelationResult>,
        liquidity_score: f64,
    ) -> HealthResult {
        let mut components: BTreeMap<String, f64> = BTreeMap::new();

        components.insert(
            COMPONENT_LIQUIDITY.to_string(),
            bounded(liquidity_score * 10.0),
        );
        if let Some(a) = anomaly {
            components.insert(
                COMPONENT_ANOMALY.to_string(),
                bounded(100.0 - severity_penalty(a.severity)),
            );
        }
        if let Some(c) = concentration {
            components.insert(
                COMPONENT_CONCENTRATION.to_string(),
                bounded(100.0 * (1.0 - c.gini)),
            );
        }
        components.insert(
            COMPONENT_WASH.to_string(),
            bounded(100.0 * (1.0 - wash_trading.confidence)),
        );
        if let Some(n) = news_correlation {
            components.insert(
                COMPONENT_NEWS.to_string(),
                bounded(100.0 - NEWS_FLAG_PENALTY * n.red_flags.len() as f64),
            );
        }

        let (weighted, total_weight) = components.iter().fold((0.0, 0.0), |(acc, tw), (name, c)| {
            let w = self.weights.weight_for(name).max(0.0);
            (acc + w * c, tw + w)
        });

        let overall = if total_weight > 0.0 {
            (weighted / total_weight).round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
        let risk_level = RiskLevel::from_health(overall);

        debug!(
            overall,
            risk = %risk_level,
            components = components.len(),
            "Health scored"
        );

        HealthResult {
            overall,
            components,
            risk_level,
        }
    }
}

fn severity_penalty(severity: Severity) -> f64 {
    match severity {
        Severity::None => 0.0,
        Severity::Low => 15.0,
        Severity::Moderate => 35.0,
        Severity::High => 60.0,
    }
}

/// NaN maps to 0 so a bad input can only lower the score.
fn bounded(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn anomaly(severity: Severity) -> AnomalyResult {
        AnomalyResult {
            z_score: 0.0,
            severity,
            is_anomalous: severity >= Severity::Low,
            latest_volume: 100.0,
            baseline_mean: 100.0,
            baseline_std: 10.0,
            baseline_points: 23,
        }
    }

    fn concentration(gini: f64) -> ConcentrationResult {
        ConcentrationResult {
            gini,
            raw_gini: gini,
            top1_pct: 10.0,
            top5_pct: 40.0,
            top10_pct: 70.0,
            wallet_count: 20,
            total_volume: 10_000.0,
        }
    }

    fn wash(confidence: f64) -> WashTradingResult {
        WashTradingResult {
            confidence,
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy_market() {
        let r = HealthScorer::default().score(
            Some(&anomaly(Severity::None)),
            &wash(0.0),
            Some(&concentration(0.2)),
            None,
            8.0,
        );
        // (80 + 100 + 80 + 100) / 4 = 90
        assert_eq!(r.overall, 90);
        assert_eq!(r.risk_level, RiskLevel::Low);
        assert_eq!(r.components.len(), 4);
        assert!(!r.components.contains_key(COMPONENT_NEWS));
    }

    #[test]
    fn test_unhealthy_market() {
        let r = HealthScorer::default().score(
            Some(&anomaly(Severity::High)),
            &wash(0.9),
            Some(&concentration(0.95)),
            None,
            1.0,
        );
        // (10 + 40 + 5 + 10) / 4 = 16.25
        assert_eq!(r.overall, 16);
        assert_eq!(r.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_missing_signals_renormalise() {
        let r = HealthScorer::default().score(None, &wash(0.0), None, None, 6.0);
        // (60 + 100) / 2
        assert_eq!(r.overall, 80);
        assert_eq!(r.components.len(), 2);
    }

    #[test]
    fn test_news_component_only_counts_when_weighted() {
        let flagged = CorrelationResult {
            correlation_score: 0.0,
            red_flags: vec!["a".into(), "b".into()],
            articles_in_window: 0,
            price_change_pct_points: 8.0,
        };
        let unweighted =
            HealthScorer::default().score(None, &wash(0.0), None, Some(&flagged), 10.0);
        assert_eq!(unweighted.overall, 100);
        assert_eq!(unweighted.components[COMPONENT_NEWS], 40.0);

        let weighted = HealthScorer::new(HealthWeights {
            news: 0.5,
            ..HealthWeights::default()
        })
        .score(None, &wash(0.0), None, Some(&flagged), 10.0);
        // (0.25*100 + 0.25*100 + 0.5*40) / 1.0
        assert_eq!(weighted.overall, 70);
    }

    #[test]
    fn test_zero_weights_score_zero() {
        let scorer = HealthScorer::new(HealthWeights {
            liquidity: 0.0,
            anomaly: 0.0,
            concentration: 0.0,
            wash_trading: 0.0,
            news: 0.0,
        });
        let r = scorer.score(None, &wash(0.0), None, None, 10.0);
        assert_eq!(r.overall, 0);
        assert_eq!(r.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_overall_always_in_range() {
        let severities = [Severity::None, Severity::Low, Severity::Moderate, Severity::High];
        for s in severities {
            for liq in [0.0, 2.5, 10.0, 25.0, -3.0, f64::NAN] {
                for g in [0.0, 0.5, 1.0] {
                    for c in [0.0, 0.3, 1.0] {
                        let r = HealthScorer::default().score(
                            Some(&anomaly(s)),
                            &wash(c),
                            Some(&concentration(g)),
                            None,
                            liq,
                        );
                        assert!(r.overall <= 100);
                        for v in r.components.values() {
                            assert!((0.0..=100.0).contains(v));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_severity_penalties() {
        let score = |s| {
            HealthScorer::default()
                .score(Some(&anomaly(s)), &wash(0.0), None, None, 10.0)
                .components[COMPONENT_ANOMALY]
        };
        assert_eq!(score(Severity::None), 100.0);
        assert_eq!(score(Severity::Low), 85.0);
        assert_eq!(score(Severity::Moderate), 65.0);
        assert_eq!(score(Severity::High), 40.0);
    }
}
