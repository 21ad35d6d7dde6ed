//! Finding classification
//!
//! Maps what one supervisor tick observed to an issue count contribution,
//! an alert severity and an operator-facing message.

use crate::config::ThresholdConfig;
use crate::domain::{BrokerConnectionState, Severity};

use super::resources::ResourceUsage;

/// Something a tick observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// Worker was down and came back after one restart
    WorkerRestarted { pid: Option<u32> },
    /// Worker was down and the restart did not bring it back
    WorkerRestartFailed { detail: String },
    /// Worker is down because today's decision withheld trading
    WorkerHeld { reason: String },
    /// Broker session was down and has been re-established
    BrokerReconnected { from: BrokerConnectionState },
    /// Broker session still down after one reconnect attempt
    BrokerReconnectFailed {
        state: BrokerConnectionState,
        detail: Option<String>,
    },
    /// Broker just entered manual intervention
    BrokerManualIntervention { detail: Option<String> },
    HighDiskUsage { percent: u8, threshold: u8 },
    HighMemoryUsage { percent: u8, threshold: u8 },
    LargeLogFile { size_mb: u64, threshold_mb: u64 },
}

impl Finding {
    /// Counts toward the tick's issue total
    pub fn is_issue(&self) -> bool {
        !matches!(self, Finding::WorkerHeld { .. })
    }

    pub fn severity(&self) -> Severity {
        match self {
            Finding::WorkerRestarted { .. } => Severity::Low,
            Finding::WorkerRestartFailed { .. } => Severity::High,
            Finding::WorkerHeld { .. } => Severity::Info,
            Finding::BrokerReconnected { .. } => Severity::Low,
            Finding::BrokerReconnectFailed { .. } => Severity::High,
            Finding::BrokerManualIntervention { .. } => Severity::Critical,
            Finding::HighDiskUsage { .. } => Severity::Medium,
            Finding::HighMemoryUsage { .. } => Severity::Medium,
            Finding::LargeLogFile { .. } => Severity::Low,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Finding::WorkerRestarted { pid } => match pid {
                Some(pid) => format!("Trading worker was down and has been restarted (PID {})", pid),
                None => "Trading worker was down and has been restarted".to_string(),
            },
            Finding::WorkerRestartFailed { detail } => {
                format!("Trading worker is down and restart failed: {}", detail)
            }
            Finding::WorkerHeld { reason } => {
                format!("Trading worker held by today's readiness decision: {}", reason)
            }
            Finding::BrokerReconnected { from } => {
                format!("Broker reconnected (was {})", from)
            }
            Finding::BrokerReconnectFailed { state, detail } => match detail {
                Some(detail) => format!("Broker reconnect failed, state {}: {}", state, detail),
                None => format!("Broker reconnect failed, state {}", state),
            },
            Finding::BrokerManualIntervention { detail } => format!(
                "Broker token expired, manual intervention required{}",
                detail
                    .as_ref()
                    .map(|d| format!(": {}", d))
                    .unwrap_or_default()
            ),
            Finding::HighDiskUsage { percent, threshold } => {
                format!("Disk usage at {}% (threshold {}%)", percent, threshold)
            }
            Finding::HighMemoryUsage { percent, threshold } => {
                format!("Memory usage at {}% (threshold {}%)", percent, threshold)
            }
            Finding::LargeLogFile {
                size_mb,
                threshold_mb,
            } => format!("Worker log is {} MB (threshold {} MB)", size_mb, threshold_mb),
        }
    }
}

/// One finding per breached threshold
pub fn evaluate_resources(usage: &ResourceUsage, thresholds: &ThresholdConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    if let Some(percent) = usage.disk_pct.filter(|p| *p > thresholds.disk_pct) {
        findings.push(Finding::HighDiskUsage {
            percent,
            threshold: thresholds.disk_pct,
        });
    }

    if let Some(percent) = usage.memory_pct.filter(|p| *p > thresholds.memory_pct) {
        findings.push(Finding::HighMemoryUsage {
            percent,
            threshold: thresholds.memory_pct,
        });
    }

    if let Some(size_mb) = usage.log_mb.filter(|mb| *mb > thresholds.log_mb) {
        findings.push(Finding::LargeLogFile {
            size_mb,
            threshold_mb: thresholds.log_mb,
        });
    }

    findings
}

/// Escalation message after `ticks` consecutive ticks with issues
pub fn escalation_message(ticks: u32, last: &[Finding]) -> String {
    let summary: Vec<String> = last
        .iter()
        .filter(|f| f.is_issue())
        .map(|f| f.message())
        .collect();
    format!(
        "Manual intervention required: {} consecutive checks with issues. Latest: {}",
        ticks,
        summary.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_are_strict() {
        let thresholds = ThresholdConfig::default();
        let usage = ResourceUsage {
            disk_pct: Some(90),
            memory_pct: Some(86),
            log_mb: Some(101),
        };

        let findings = evaluate_resources(&usage, &thresholds);
        assert_eq!(
            findings,
            vec![
                Finding::HighMemoryUsage {
                    percent: 86,
                    threshold: 85
                },
                Finding::LargeLogFile {
                    size_mb: 101,
                    threshold_mb: 100
                },
            ]
        );
    }

    #[test]
    fn test_disk_breach_is_medium() {
        let usage = ResourceUsage {
            disk_pct: Some(92),
            ..Default::default()
        };
        let findings = evaluate_resources(&usage, &ThresholdConfig::default());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity(), Severity::Medium);
        assert!(findings[0].message().contains("92%"));
    }

    #[test]
    fn test_held_worker_is_not_an_issue() {
        let held = Finding::WorkerHeld {
            reason: "confidence 0.32 below 0.40".into(),
        };
        assert!(!held.is_issue());
        assert!(Finding::WorkerRestarted { pid: None }.is_issue());
    }

    #[test]
    fn test_missing_samples_raise_nothing() {
        let findings = evaluate_resources(&ResourceUsage::default(), &ThresholdConfig::default());
        assert!(findings.is_empty());
    }
}
