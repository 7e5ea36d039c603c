//! Trader concentration.
//!
//! Measures how unevenly traded volume is spread across wallets using the
//! Gini coefficient and top-N volume shares.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{ConcentrationResult, IntegrityError, Trade};

const DETECTOR: &str = "trader_concentration";

#[derive(Debug, Clone, Deserialize)]
pub struct ConcentrationConfig {
    /// Rescale the raw Gini by n/(n-1) so a single dominant wallet scores
    /// close to 1 even in small samples.
    #[serde(default = "default_small_sample_correction")]
    pub small_sample_correction: bool,
}

fn default_small_sample_correction() -> bool {
    true
}

impl Default for ConcentrationConfig {
    fn default() -> Self {
        Self {
            small_sample_correction: default_small_sample_correction(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConcentrationAnalyzer {
    config: ConcentrationConfig,
}

impl ConcentrationAnalyzer {
    pub fn new(config: ConcentrationConfig) -> Self {
        Self { config }
    }

    /// Aggregate notional per wallet and measure its inequality.
    pub fn analyze(&self, trades: &[Trade]) -> Result<ConcentrationResult, IntegrityError> {
        let mut per_wallet: HashMap<&str, f64> = HashMap::new();
        for t in trades {
            *per_wallet.entry(t.wallet_id.as_str()).or_default() += t.notional();
        }

        let mut volumes: Vec<f64> = per_wallet.into_values().collect();
        let total: f64 = volumes.iter().sum();
        if volumes.is_empty() || !(total > 0.0) {
            return Err(IntegrityError::EmptyDataset {
                detector: DETECTOR.to_string(),
            });
        }

        // Largest first for the top-N shares.
        volumes.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let share = |n: usize| volumes.iter().take(n).sum::<f64>() / total * 100.0;
        let (top1_pct, top5_pct, top10_pct) = (share(1), share(5), share(10));

        volumes.reverse();
        let (raw_gini, gini) = self.gini(&volumes);

        debug!(
            wallets = volumes.len(),
            gini = format!("{gini:.3}"),
            raw_gini = format!("{raw_gini:.3}"),
            top1 = format!("{top1_pct:.1}%"),
            "Concentration computed"
        );

        Ok(ConcentrationResult {
            gini,
            raw_gini,
            top1_pct,
            top5_pct,
            top10_pct,
            wallet_count: volumes.len(),
            total_volume: total,
        })
    }

    /// Gini over volumes sorted ascending:
    /// `2 Σ i·v_i / (n Σ v) - (n+1)/n`, i from 1. Returns the raw value
    /// and the reported one.
    fn gini(&self, ascending: &[f64]) -> (f64, f64) {
        let n = ascending.len();
        let total: f64 = ascending.iter().sum();
        if n < 2 || total <= 0.0 {
            return (0.0, 0.0);
        }
        let nf = n as f64;
        let weighted: f64 = ascending
            .iter()
            .enumerate()
            .map(|(i, v)| (i as f64 + 1.0) * v)
            .sum();
        let raw = (2.0 * weighted / (nf * total) - (nf + 1.0) / nf).clamp(0.0, 1.0);
        let g = if self.config.small_sample_correction {
            raw * nf / (nf - 1.0)
        } else {
            raw
        };
        (raw, g.clamp(0.0, 1.0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
