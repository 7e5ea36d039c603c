//! Historical pattern matching.
//!
//! Compares the current signal vector against a library of reference
//! cases using cosine similarity. The built-in library is compiled into
//! the binary and parsed once; a replacement can be loaded from disk via
//! [`crate::storage::load_case_library`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::types::{
    AnomalyResult, ConcentrationResult, CorrelationResult, HistoricalMatch, IntegrityError,
    WashTradingResult,
};

const BUILTIN_CASES: &str = include_str!("../../data/historical_cases.json");

// ---------------------------------------------------------------------------
// Pattern type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    VolumeSpike,
    WashTrading,
    Coordinated,
    All,
}

impl PatternType {
    /// Whether a case tagged `case_pattern` passes this filter.
    pub fn admits(&self, case_pattern: PatternType) -> bool {
        *self == PatternType::All || *self == case_pattern
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternType::VolumeSpike => write!(f, "volume_spike"),
            PatternType::WashTrading => write!(f, "wash_trading"),
            PatternType::Coordinated => write!(f, "coordinated"),
            PatternType::All => write!(f, "all"),
        }
    }
}

impl FromStr for PatternType {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "volume_spike" => Ok(PatternType::VolumeSpike),
            "wash_trading" => Ok(PatternType::WashTrading),
            "coordinated" => Ok(PatternType::Coordinated),
            "all" | "" => Ok(PatternType::All),
            _ => Err(IntegrityError::Configuration(format!(
                "unknown pattern type: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Signal vector
// ---------------------------------------------------------------------------

/// `[z_score, gini, wash_confidence, correlation_score]`; absent signals are 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalVector(pub [f64; 4]);

impl SignalVector {
    pub fn new(z_score: f64, gini: f64, wash_confidence: f64, correlation_score: f64) -> Self {
        SignalVector([z_score, gini, wash_confidence, correlation_score])
    }

    pub fn from_signals(
        anomaly: Option<&AnomalyResult>,
        concentration: Option<&ConcentrationResult>,
        wash_trading: &WashTradingResult,
        news_correlation: Option<&CorrelationResult>,
    ) -> Self {
        Self::new(
            anomaly.map(|a| a.z_score).unwrap_or(0.0),
            concentration.map(|c| c.gini).unwrap_or(0.0),
            wash_trading.confidence,
            news_correlation.map(|n| n.correlation_score).unwrap_or(0.0),
        )
    }

    /// Cosine similarity clamped to [0, 1]; 0 when either vector is zero.
    pub fn similarity(&self, other: &SignalVector) -> f64 {
        let dot: f64 = self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum();
        let norm_a = self.0.iter().map(|v| v * v).sum::<f64>().sqrt();
        let norm_b = other.0.iter().map(|v| v * v).sum::<f64>().sqrt();
        if !(norm_a > 0.0) || !(norm_b > 0.0) {
            return 0.0;
        }
        let sim = dot / (norm_a * norm_b);
        if sim.is_nan() {
            0.0
        } else {
            sim.clamp(0.0, 1.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Case library
// ---------------------------------------------------------------------------

/// A reference case with a known outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalCase {
    pub case_id: String,
    pub market: String,
    pub pattern: PatternType,
    pub occurred_on: NaiveDate,
    pub outcome: String,
    #[serde(default)]
    pub details: String,
    pub confirmed_manipulation: bool,
    pub signals: SignalVector,
}

/// Immutable set of reference cases. Share it behind an `Arc` and swap the
/// handle to update.
#[derive(Debug, Clone, Default)]
pub struct CaseLibrary {
    cases: Vec<HistoricalCase>,
}

static BUILTIN: OnceLock<Result<Arc<CaseLibrary>, String>> = OnceLock::new();

impl CaseLibrary {
    pub fn from_cases(cases: Vec<HistoricalCase>) -> Self {
        Self { cases }
    }

    /// Parse a JSON array of cases.
    pub fn from_json(json: &str) -> Result<Self, IntegrityError> {
        let cases: Vec<HistoricalCase> = serde_json::from_str(json)
            .map_err(|e| IntegrityError::Configuration(format!("invalid case library: {e}")))?;
        if cases.iter().any(|c| c.pattern == PatternType::All) {
            return Err(IntegrityError::Configuration(
                "case pattern cannot be \"all\"".to_string(),
            ));
        }
        Ok(Self { cases })
    }

    /// The library compiled into the binary, parsed on first use.
    pub fn builtin() -> Result<Arc<CaseLibrary>, IntegrityError> {
        BUILTIN
            .get_or_init(|| {
                CaseLibrary::from_json(BUILTIN_CASES)
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .clone()
            .map_err(IntegrityError::Internal)
    }

    pub fn cases(&self) -> &[HistoricalCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Matches below this similarity are dropped.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

fn default_min_similarity() -> f64 {
    0.5
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoricalPatternMatcher {
    library: Arc<CaseLibrary>,
    config: HistoryConfig,
}

impl HistoricalPatternMatcher {
    pub fn new(library: Arc<CaseLibrary>, config: HistoryConfig) -> Self {
        Self { library, config }
    }

    pub fn library(&self) -> &Arc<CaseLibrary> {
        &self.library
    }

    /// Point the matcher at a different library.
    pub fn replace_library(&mut self, library: Arc<CaseLibrary>) {
        self.library = library;
    }

    /// Cases similar to `signals`, most similar first. Equal similarity
    /// goes to the more recent case, then to the lower case id.
    pub fn match_patterns(
        &self,
        signals: &SignalVector,
        pattern_type: PatternType,
    ) -> Vec<HistoricalMatch> {
        let mut matches: Vec<HistoricalMatch> = self
            .library
            .cases()
            .iter()
            .filter(|c| pattern_type.admits(c.pattern))
            .filter_map(|c| {
                let similarity = signals.similarity(&c.signals);
                (similarity >= self.config.min_similarity).then(|| HistoricalMatch {
                    case_id: c.case_id.clone(),
                    similarity,
                    market: c.market.clone(),
                    pattern: c.pattern.to_string(),
                    occurred_on: c.occurred_on,
                    confirmed: c.confirmed_manipulation,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.occurred_on.cmp(&a.occurred_on))
                .then_with(|| a.case_id.cmp(&b.case_id))
        });

        debug!(
            pattern = %pattern_type,
            candidates = self.library.len(),
            matches = matches.len(),
            "Historical patterns matched"
        );

        matches
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
