//! Volume anomaly detection.
//!
//! Scores the most recent volume interval against a trailing baseline
//! using a z-score. The baseline excludes the interval being scored.

use chrono::Duration;
use serde::Deserialize;
use tracing::debug;

use super::mean_std;
use crate::types::{AnomalyResult, IntegrityError, Severity, VolumePoint};

const DETECTOR: &str = "volume_anomaly";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct VolumeConfig {
    /// Fewer baseline points than this is insufficient data.
    #[serde(default = "default_min_baseline_points")]
    pub min_baseline_points: usize,
}

fn default_min_baseline_points() -> usize {
    3
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            min_baseline_points: default_min_baseline_points(),
        }
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct VolumeAnomalyDetector {
    config: VolumeConfig,
}

impl VolumeAnomalyDetector {
    pub fn new(config: VolumeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// Score the latest point of `series` against the points in the
    /// `window` immediately preceding it.
    pub fn detect(
        &self,
        series: &[VolumePoint],
        window: Duration,
    ) -> Result<AnomalyResult, IntegrityError> {
        let (latest, history) = series.split_last().ok_or_else(|| insufficient("empty volume series"))?;

        let cutoff = latest.timestamp - window;
        let baseline: Vec<f64> = history
            .iter()
            .filter(|p| p.timestamp >= cutoff && p.timestamp < latest.timestamp)
            .map(|p| p.volume)
            .collect();

        if baseline.len() < self.config.min_baseline_points {
            return Err(insufficient(format!(
                "{} baseline points, need {}",
                baseline.len(),
                self.config.min_baseline_points
            )));
        }

        let (mean, std) = mean_std(&baseline).ok_or_else(|| insufficient("empty baseline"))?;
        if !(std > f64::EPSILON) {
            return Err(insufficient("baseline has zero variance"));
        }

        let z_score = (latest.volume - mean) / std;
        let severity = Severity::from_z(z_score);

        debug!(
            latest = latest.volume,
            mean,
            std,
            z = format!("{z_score:.2}"),
            severity = %severity,
            "Volume scored"
        );

        Ok(AnomalyResult {
            z_score,
            severity,
            is_anomalous: severity >= Severity::Low,
            latest_volume: latest.volume,
            baseline_mean: mean,
            baseline_std: std,
            baseline_points: baseline.len(),
        })
    }
}

fn insufficient(reason: impl Into<String>) -> IntegrityError {
    IntegrityError::InsufficientData {
        detector: DETECTOR.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
