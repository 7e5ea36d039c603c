//! Statistical manipulation detectors.
//!
//! Each detector is a pure function of its input snapshot plus a small
//! threshold config. None of them depends on another's output, so the
//! orchestrator can run them concurrently.

pub mod concentration;
pub mod news;
pub mod volume;
pub mod wash;

pub use concentration::{ConcentrationAnalyzer, ConcentrationConfig};
pub use news::{NewsConfig, NewsCorrelationAnalyzer};
pub use volume::{VolumeAnomalyDetector, VolumeConfig};
pub use wash::{WashConfig, WashTradingDetector};

/// Population mean and standard deviation. `None` for an empty slice.
pub(crate) fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}
