//! Scoring layer: health score, historical pattern similarity and the
//! manipulation report built on top of the detector outputs.

pub mod health;
pub mod history;
pub mod report;

pub use health::{HealthScorer, HealthWeights};
pub use history::{
    CaseLibrary, HistoricalCase, HistoricalPatternMatcher, HistoryConfig, PatternType,
    SignalVector,
};
pub use report::{ManipulationReport, ReportFlag};
