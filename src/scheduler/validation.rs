//! Morning job: fast validation of the latest parameters against
//! pre-market intelligence

use super::artifacts::ArtifactStore;
use super::confidence::{adjust_parameters, confidence_score, MIN_TRADING_CONFIDENCE};
use super::intelligence::IntelligenceSource;
use crate::broker::BrokerMonitor;
use crate::config::SchedulerConfig;
use crate::domain::{
    BrokerConnectionState, ConfidenceBand, DecisionSource, IntelligenceReport,
    OptimizationParameterSet, ParameterMatrix, Severity, ValidationDecision,
};
use crate::error::{Result, VigilError};
use crate::persistence::{write_json_atomic, StatusStore};
use crate::supervisor::AlertDispatcher;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Thresholds and output locations for the morning job
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    pub min_confidence: f64,
    pub degraded_confidence: f64,
    pub intelligence_timeout: Duration,
    pub decision_file: PathBuf,
    pub failure_report_file: PathBuf,
}

impl ValidationPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            degraded_confidence: config.degraded_confidence,
            intelligence_timeout: Duration::from_secs(config.intelligence_timeout_secs),
            decision_file: config.decision_file.clone(),
            failure_report_file: config.failure_report_file.clone(),
        }
    }
}

/// Written when neither the full nor the degraded path produced a decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub trading_day: NaiveDate,
    pub failed_at: DateTime<FixedOffset>,
    pub errors: Vec<String>,
    pub broker_state: BrokerConnectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intelligence: Option<IntelligenceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_day: Option<NaiveDate>,
}

/// Turn the gathered inputs into a decision
///
/// Deterministic: the same inputs always give the same decision. Without an
/// artifact trading is withheld; without a report the degraded confidence
/// is used.
pub fn decide(
    trading_day: NaiveDate,
    artifact: Option<&OptimizationParameterSet>,
    report: Option<&IntelligenceReport>,
    broker: BrokerConnectionState,
    policy: &ValidationPolicy,
) -> ValidationDecision {
    let mut rationale = Vec::new();

    let Some(artifact) = artifact else {
        rationale.push("no usable parameter artifact".to_string());
        if broker.requires_operator() {
            rationale.push("broker requires manual intervention".to_string());
        }
        return ValidationDecision {
            trading_day,
            trading_ready: false,
            confidence_score: 0.0,
            band: ConfidenceBand::Minimal,
            source: DecisionSource::Failed,
            adjusted_parameters: ParameterMatrix::new(),
            artifact_day: None,
            artifact_age_days: None,
            artifact_fingerprint: None,
            rationale,
        };
    };

    let (score, source) = match report {
        Some(report) => {
            let score = confidence_score(report);
            rationale.push(format!(
                "risk {:.0} ({:?}), sentiment {:?}, global bias {:?} -> confidence {:.2}",
                report.risk_score,
                report.risk_level,
                report.sentiment_category,
                report.global_bias,
                score
            ));
            (score, DecisionSource::Full)
        }
        None => {
            rationale.push(format!(
                "intelligence unavailable, degraded confidence {:.2}",
                policy.degraded_confidence
            ));
            (policy.degraded_confidence, DecisionSource::Degraded)
        }
    };

    let band = ConfidenceBand::from_score(score);
    let age = (trading_day - artifact.trading_day).num_days();
    if age > 1 {
        rationale.push(format!(
            "parameters from {} are {} days old",
            artifact.trading_day, age
        ));
    }

    let minimum = policy.min_confidence.max(MIN_TRADING_CONFIDENCE);
    let confident = score >= minimum;
    if !confident {
        rationale.push(format!(
            "confidence {:.2} below minimum {:.2}",
            score, minimum
        ));
    }
    if broker.requires_operator() {
        rationale.push("broker requires manual intervention".to_string());
    }

    ValidationDecision {
        trading_day,
        trading_ready: confident && !broker.requires_operator(),
        confidence_score: score,
        band,
        source,
        adjusted_parameters: adjust_parameters(&artifact.strategies, band),
        artifact_day: Some(artifact.trading_day),
        artifact_age_days: Some(age),
        artifact_fingerprint: Some(artifact.fingerprint()),
        rationale,
    }
}

pub struct MorningJob {
    policy: ValidationPolicy,
    intelligence: Arc<dyn IntelligenceSource>,
    artifacts: ArtifactStore,
    /// Probed before validating when present
    broker: Option<Arc<BrokerMonitor>>,
    store: StatusStore,
    alerts: Arc<AlertDispatcher>,
}

impl MorningJob {
    pub fn new(
        policy: ValidationPolicy,
        intelligence: Arc<dyn IntelligenceSource>,
        artifacts: ArtifactStore,
        broker: Option<Arc<BrokerMonitor>>,
        store: StatusStore,
        alerts: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            policy,
            intelligence,
            artifacts,
            broker,
            store,
            alerts,
        }
    }

    /// Produce and persist today's decision
    ///
    /// A failed intelligence fetch or artifact load gets one degraded retry
    /// (parameters only). Total failure still yields a decision, with
    /// trading withheld, plus a failure report and a CRITICAL alert.
    pub async fn run_morning(
        &self,
        trading_day: NaiveDate,
        now: DateTime<FixedOffset>,
    ) -> Result<ValidationDecision> {
        info!("Morning validation for {}", trading_day);
        let broker = self.broker_state().await;
        let mut errors = Vec::new();

        let report = match self.fetch_intelligence().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Intelligence fetch failed: {}", e);
                errors.push(e.to_string());
                None
            }
        };

        let artifact = match self.artifacts.load_latest() {
            Ok(set) => Some(set),
            Err(e) => {
                warn!("Parameter artifact load failed: {}", e);
                errors.push(e.to_string());
                None
            }
        };

        let decision = match (artifact, report) {
            (Some(artifact), Some(report)) => {
                decide(trading_day, Some(&artifact), Some(&report), broker, &self.policy)
            }
            (artifact, report) => {
                info!("Falling back to degraded validation");
                let artifact = match artifact {
                    Some(artifact) => Some(artifact),
                    None => match self.artifacts.load_latest() {
                        Ok(set) => Some(set),
                        Err(e) => {
                            errors.push(format!("degraded retry: {}", e));
                            None
                        }
                    },
                };

                let decision = decide(trading_day, artifact.as_ref(), None, broker, &self.policy);
                if decision.source == DecisionSource::Failed {
                    self.report_failure(trading_day, now, &errors, broker, report, &decision)
                        .await?;
                } else {
                    self.alerts
                        .dispatch(
                            Severity::Medium,
                            format!(
                                "Degraded validation for {}: {}",
                                trading_day,
                                errors.join("; ")
                            ),
                        )
                        .await;
                }
                decision
            }
        };

        self.persist(&decision, now)?;
        info!(
            "Decision for {}: ready={} confidence={:.2} band={} source={:?}",
            decision.trading_day,
            decision.trading_ready,
            decision.confidence_score,
            decision.band,
            decision.source
        );
        Ok(decision)
    }

    async fn broker_state(&self) -> BrokerConnectionState {
        let Some(ref monitor) = self.broker else {
            return self.store.load().broker_state();
        };
        match monitor.check().await {
            Ok(state) => state,
            Err(e) => {
                warn!("Broker probe before validation failed: {}", e);
                monitor.state().await
            }
        }
    }

    async fn fetch_intelligence(&self) -> Result<IntelligenceReport> {
        let limit = self.policy.intelligence_timeout;
        match tokio::time::timeout(limit, self.intelligence.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(VigilError::Timeout {
                what: "intelligence fetch".to_string(),
                secs: limit.as_secs(),
            }),
        }
    }

    async fn report_failure(
        &self,
        trading_day: NaiveDate,
        now: DateTime<FixedOffset>,
        errors: &[String],
        broker: BrokerConnectionState,
        intelligence: Option<IntelligenceReport>,
        decision: &ValidationDecision,
    ) -> Result<()> {
        let report = FailureReport {
            trading_day,
            failed_at: now,
            errors: errors.to_vec(),
            broker_state: broker,
            intelligence,
            artifact_day: decision.artifact_day,
        };
        write_json_atomic(&self.policy.failure_report_file, &report)?;
        error!(
            "Morning validation failed for {}; report at {}",
            trading_day,
            self.policy.failure_report_file.display()
        );

        self.alerts
            .dispatch(
                Severity::Critical,
                format!(
                    "Morning validation failed for {}, trading withheld: {}",
                    trading_day,
                    errors.join("; ")
                ),
            )
            .await;
        Ok(())
    }

    fn persist(&self, decision: &ValidationDecision, now: DateTime<FixedOffset>) -> Result<()> {
        write_json_atomic(&self.policy.decision_file, decision)?;
        self.store.write_validation(&decision.summary(now))
    }
}
