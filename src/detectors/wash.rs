//! Wash-trading detection.
//!
//! Infers counterparties by pairing opposite-side fills that land close in
//! time and price, builds a directed seller → buyer graph, and flags wallet
//! pairs that keep trading back and forth with each other. This is a
//! heuristic: a flagged pair is grounds for review, not proof.

use chrono::Duration;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{SuspiciousPair, Trade, TradeSide, WalletPair, WashTradingResult};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WashConfig {
    /// Max seconds between two fills for them to be counterparties.
    #[serde(default = "default_max_match_gap_secs")]
    pub max_match_gap_secs: i64,
    /// Max relative price difference between counterparty fills.
    #[serde(default = "default_price_tolerance")]
    pub price_tolerance: f64,
    #[serde(default = "default_min_round_trips")]
    pub min_round_trips: usize,
    /// Round trips as a fraction of each wallet's total trade count.
    #[serde(default = "default_min_round_trip_share")]
    pub min_round_trip_share: f64,
    /// Round-trip count at which confidence saturates.
    #[serde(default = "default_saturation_round_trips")]
    pub saturation_round_trips: usize,
}

fn default_max_match_gap_secs() -> i64 {
    60
}
fn default_price_tolerance() -> f64 {
    0.005
}
fn default_min_round_trips() -> usize {
    3
}
fn default_min_round_trip_share() -> f64 {
    0.4
}
fn default_saturation_round_trips() -> usize {
    10
}

impl Default for WashConfig {
    fn default() -> Self {
        Self {
            max_match_gap_secs: default_max_match_gap_secs(),
            price_tolerance: default_price_tolerance(),
            min_round_trips: default_min_round_trips(),
            min_round_trip_share: default_min_round_trip_share(),
            saturation_round_trips: default_saturation_round_trips(),
        }
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct WashTradingDetector {
    config: WashConfig,
}

impl WashTradingDetector {
    pub fn new(config: WashConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WashConfig {
        &self.config
    }

    /// Scan fills within `lookback` of the most recent fill.
    pub fn detect(&self, trades: &[Trade], lookback: Duration) -> WashTradingResult {
        let Some(latest) = trades.iter().map(|t| t.timestamp).max() else {
            return WashTradingResult::default();
        };
        let cutoff = latest - lookback;

        let mut scope: Vec<&Trade> = trades.iter().filter(|t| t.timestamp >= cutoff).collect();
        scope.sort_by_key(|t| t.timestamp);

        let mut trade_counts: HashMap<&str, usize> = HashMap::new();
        for t in &scope {
            *trade_counts.entry(t.wallet_id.as_str()).or_default() += 1;
        }

        // (seller, buyer) → relative price gaps of each matched fill
        let mut edges: HashMap<(&str, &str), Vec<f64>> = HashMap::new();
        let mut matched = vec![false; scope.len()];

        for i in 0..scope.len() {
            if matched[i] {
                continue;
            }
            let a = scope[i];
            let counterparty = self.first_cross(&scope, i, |j| {
                !matched[j] && scope[j].wallet_id != a.wallet_id
            });
            if let Some((j, gap)) = counterparty {
                matched[i] = true;
                matched[j] = true;
                let b = scope[j];
                let (seller, buyer) = match a.side {
                    TradeSide::Sell => (a.wallet_id.as_str(), b.wallet_id.as_str()),
                    TradeSide::Buy => (b.wallet_id.as_str(), a.wallet_id.as_str()),
                };
                edges.entry((seller, buyer)).or_default().push(gap);
            }
        }

        // Same-wallet crosses are tallied on their own so they never take a
        // fill away from a counterparty match.
        let mut self_crossed = vec![false; scope.len()];
        let mut self_trades = 0usize;
        for i in 0..scope.len() {
            if self_crossed[i] {
                continue;
            }
            let wallet = scope[i].wallet_id.as_str();
            let own = self.first_cross(&scope, i, |j| {
                !self_crossed[j] && scope[j].wallet_id == wallet
            });
            if let Some((j, _)) = own {
                self_crossed[i] = true;
                self_crossed[j] = true;
                self_trades += 1;
            }
        }

        let matched_fills = matched.iter().filter(|m| **m).count();
        let mut pairs = Vec::new();

        for (&(seller, buyer), forward) in &edges {
            // Visit each unordered pair once, from its lexically smaller seller.
            if seller >= buyer {
                continue;
            }
            let Some(backward) = edges.get(&(buyer, seller)) else {
                continue;
            };

            let round_trips = forward.len().min(backward.len());
            if round_trips < self.config.min_round_trips {
                continue;
            }
            let share_ok = [seller, buyer].iter().all(|w| {
                let total = trade_counts.get(w).copied().unwrap_or(0) as f64;
                round_trips as f64 >= self.config.min_round_trip_share * total
            });
            if !share_ok {
                debug!(
                    pair = %WalletPair::new(seller, buyer),
                    round_trips,
                    "Round trips below share of wallet activity"
                );
                continue;
            }

            let gaps: Vec<f64> = forward.iter().chain(backward.iter()).copied().collect();
            let avg_price_gap = gaps.iter().sum::<f64>() / gaps.len() as f64;
            let tightness = gaps
                .iter()
                .map(|g| self.tightness(*g))
                .sum::<f64>()
                / gaps.len() as f64;

            pairs.push(SuspiciousPair {
                pair: WalletPair::new(seller, buyer),
                round_trips,
                avg_price_gap,
                confidence: self.pair_confidence(round_trips, tightness),
            });
        }

        pairs.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.pair.cmp(&b.pair))
        });

        let confidence = pairs.iter().map(|p| p.confidence).fold(0.0, f64::max);

        debug!(
            fills = scope.len(),
            matched_fills,
            self_trades,
            suspicious = pairs.len(),
            confidence = format!("{confidence:.2}"),
            "Wash trading scan complete"
        );

        WashTradingResult {
            suspicious_pairs: pairs,
            confidence,
            matched_fills,
            self_trades,
        }
    }

    /// Earliest fill after `i` on the opposite side, within the time and
    /// price tolerances, that `eligible` accepts. Returns its index and the
    /// relative price gap.
    fn first_cross(
        &self,
        scope: &[&Trade],
        i: usize,
        eligible: impl Fn(usize) -> bool,
    ) -> Option<(usize, f64)> {
        let a = scope[i];
        let max_gap = Duration::seconds(self.config.max_match_gap_secs);
        for (j, b) in scope.iter().enumerate().skip(i + 1) {
            if b.timestamp - a.timestamp > max_gap {
                break;
            }
            if b.side == a.side || !eligible(j) {
                continue;
            }
            let gap = relative_gap(a.price, b.price);
            if gap <= self.config.price_tolerance {
                return Some((j, gap));
            }
        }
        None
    }

    /// `min(1, round_trips / saturation)` scaled by price tightness.
    pub fn pair_confidence(&self, round_trips: usize, tightness: f64) -> f64 {
        let saturation = self.config.saturation_round_trips.max(1) as f64;
        let base = (round_trips as f64 / saturation).min(1.0);
        (base * (0.5 + 0.5 * tightness.clamp(0.0, 1.0))).clamp(0.0, 1.0)
    }

    /// 1.0 for identical prices, 0.0 at the tolerance edge.
    fn tightness(&self, gap: f64) -> f64 {
        if self.config.price_tolerance <= 0.0 {
            return 1.0;
        }
        (1.0 - gap / self.config.price_tolerance).clamp(0.0, 1.0)
    }
}

fn relative_gap(a: f64, b: f64) -> f64 {
    let hi = a.max(b);
    if hi <= 0.0 {
        0.0
    } else {
        (a - b).abs() / hi
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
