use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Directional reading used for both news sentiment and global bias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bias {
    Positive,
    #[default]
    Neutral,
    Negative,
}

/// Overnight risk bucket reported by the intelligence generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Free-form advice carried by the report; informational only
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Recommendations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_sizing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_preference: Option<String>,
    #[serde(default)]
    pub specific_actions: Vec<String>,
}

/// Pre-market intelligence, produced by an external generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceReport {
    pub sentiment_category: Bias,
    pub global_bias: Bias,
    pub risk_level: RiskLevel,
    /// 0-100, higher is riskier
    pub risk_score: f64,
    #[serde(default)]
    pub recommendations: Recommendations,
}

/// Optimized parameters for one strategy on one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    pub stop_loss: f64,
    pub position_size: f64,
    #[serde(default)]
    pub optimization_score: f64,
    /// Strategy-specific values passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// strategy -> symbol -> parameters
pub type ParameterMatrix = BTreeMap<String, BTreeMap<String, StrategyParams>>;

/// Output of one evening optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationParameterSet {
    /// Trading day the parameters were optimized after
    pub trading_day: NaiveDate,
    pub generated_at: DateTime<FixedOffset>,
    pub strategies: ParameterMatrix,
    /// `strategy/symbol` cells whose search failed
    #[serde(default)]
    pub failed_cells: Vec<String>,
}

impl OptimizationParameterSet {
    pub fn cell_count(&self) -> usize {
        self.strategies.values().map(|symbols| symbols.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_count() == 0
    }

    /// SHA-256 of the canonical JSON form
    pub fn fingerprint(&self) -> String {
        let payload = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(payload);
        hex::encode(hasher.finalize())
    }
}

/// Position sizing band selected from the confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceBand {
    /// >= 0.8
    Full,
    /// 0.6 - 0.8
    Standard,
    /// 0.4 - 0.6
    Reduced,
    /// < 0.4
    Minimal,
}

impl ConfidenceBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceBand::Full
        } else if score >= 0.6 {
            ConfidenceBand::Standard
        } else if score >= 0.4 {
            ConfidenceBand::Reduced
        } else {
            ConfidenceBand::Minimal
        }
    }

    pub fn position_multiplier(&self) -> f64 {
        match self {
            ConfidenceBand::Full => 1.25,
            ConfidenceBand::Standard => 1.0,
            ConfidenceBand::Reduced => 0.75,
            ConfidenceBand::Minimal => 0.25,
        }
    }

    /// Applied to the stop-loss distance; < 1 tightens, > 1 relaxes
    pub fn stop_loss_multiplier(&self) -> f64 {
        match self {
            ConfidenceBand::Full => 1.2,
            ConfidenceBand::Standard => 1.0,
            ConfidenceBand::Reduced => 0.8,
            ConfidenceBand::Minimal => 0.6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::Full => "FULL",
            ConfidenceBand::Standard => "STANDARD",
            ConfidenceBand::Reduced => "REDUCED",
            ConfidenceBand::Minimal => "MINIMAL",
        }
    }
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which validation path produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    /// Parameters + intelligence
    Full,
    /// Parameters only, intelligence unavailable
    Degraded,
    /// Nothing usable; trading withheld
    Failed,
}

/// Go/no-go output of the morning job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationDecision {
    pub trading_day: NaiveDate,
    pub trading_ready: bool,
    pub confidence_score: f64,
    pub band: ConfidenceBand,
    pub source: DecisionSource,
    pub adjusted_parameters: ParameterMatrix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_day: Option<NaiveDate>,
    /// Whole days between the artifact and the trading day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_age_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_fingerprint: Option<String>,
    pub rationale: Vec<String>,
}

impl ValidationDecision {
    pub fn summary(&self, decided_at: DateTime<FixedOffset>) -> ValidationSummary {
        ValidationSummary {
            trading_day: self.trading_day,
            trading_ready: self.trading_ready,
            confidence_score: self.confidence_score,
            band: self.band,
            source: self.source,
            rationale: self.rationale.clone(),
            launch_action: None,
            decided_at,
        }
    }
}

/// Validation section of the status store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub trading_day: NaiveDate,
    pub trading_ready: bool,
    pub confidence_score: f64,
    pub band: ConfidenceBand,
    pub source: DecisionSource,
    pub rationale: Vec<String>,
    /// What the worker launcher did with the decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_action: Option<String>,
    pub decided_at: DateTime<FixedOffset>,
}
