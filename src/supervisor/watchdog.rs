//! Supervisor Loop
//!
//! One tick per poll interval. Outside market hours a tick only records a
//! standby snapshot; inside market hours it checks the worker, the broker
//! and host resources in that order, takes at most one corrective action
//! for each, and persists a health snapshot.

use super::alert_manager::AlertDispatcher;
use super::playbook::{escalation_message, evaluate_resources, Finding};
use super::resources::ResourceProbe;
use crate::broker::BrokerMonitor;
use crate::clock::{Clock, MarketCalendar};
use crate::config::{SupervisorConfig, ThresholdConfig};
use crate::domain::{BotStatus, BrokerConnectionState, HealthSnapshot, MarketStatus, Severity};
use crate::error::Result;
use crate::launcher::WorkerControl;
use crate::persistence::StatusStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome of one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: HealthSnapshot,
    pub findings: Vec<Finding>,
    /// A CRITICAL escalation was dispatched on this tick
    pub escalated: bool,
    /// Consecutive ticks with issues after this tick
    pub consecutive_failures: u32,
}

/// Collaborators of the supervisor loop
pub struct SupervisorParts {
    pub calendar: MarketCalendar,
    pub clock: Arc<dyn Clock>,
    pub worker: Arc<dyn WorkerControl>,
    pub broker: Arc<BrokerMonitor>,
    pub resources: Arc<dyn ResourceProbe>,
    pub alerts: Arc<AlertDispatcher>,
    pub store: StatusStore,
}

pub struct Supervisor {
    config: SupervisorConfig,
    thresholds: ThresholdConfig,
    parts: SupervisorParts,
    consecutive_failures: u32,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, thresholds: ThresholdConfig, parts: SupervisorParts) -> Self {
        Self {
            config,
            thresholds,
            parts,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Tick until `shutdown` resolves. A failed tick is logged and the loop
    /// carries on at the next interval.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let poll = Duration::from_secs(self.config.poll_interval_secs);
        info!("Supervisor started (poll interval {:?})", poll);

        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) => debug!(
                            "Tick: market={:?} bot={} broker={} issues={}",
                            report.snapshot.market_status,
                            report.snapshot.bot_status,
                            report.snapshot.broker_status,
                            report.snapshot.issues_count
                        ),
                        Err(e) => error!("Supervisor tick aborted: {}", e),
                    }
                }
            }
        }

        info!("Supervisor stopping, flushing alerts");
        self.parts.alerts.flush().await;
        Ok(())
    }

    pub async fn tick(&mut self) -> Result<TickReport> {
        let now = self.parts.clock.now();
        if !self.parts.calendar.is_open(now) {
            return self.standby_tick().await;
        }

        let mut findings = Vec::new();
        let (bot_running, bot_status) = self.check_worker(&mut findings).await;
        let broker_status = self.check_broker(&mut findings).await?;

        let usage = self.parts.resources.sample();
        findings.extend(evaluate_resources(&usage, &self.thresholds));

        for finding in &findings {
            if !finding.is_issue() {
                debug!("{}", finding.message());
                continue;
            }
            self.parts
                .alerts
                .dispatch(finding.severity(), finding.message())
                .await;
        }

        let issues_count = findings.iter().filter(|f| f.is_issue()).count() as u32;
        let escalated = self.escalate(issues_count, &findings).await;

        let snapshot = HealthSnapshot {
            market_status: MarketStatus::Open,
            market_open: true,
            bot_running,
            bot_status,
            broker_status,
            disk_usage_pct: usage.disk_pct,
            memory_usage_pct: usage.memory_pct,
            log_size_mb: usage.log_mb,
            issues_count,
            last_check: self.parts.clock.now(),
        };
        self.parts.store.write_health(&snapshot)?;

        Ok(TickReport {
            snapshot,
            findings,
            escalated,
            consecutive_failures: self.consecutive_failures,
        })
    }

    /// One existence check, no corrective action
    async fn standby_tick(&mut self) -> Result<TickReport> {
        let bot_running = self.parts.worker.is_alive().await;
        let broker_status = self.parts.store.load().broker_state();
        let snapshot = HealthSnapshot::standby(bot_running, broker_status, self.parts.clock.now());

        self.consecutive_failures = 0;
        self.parts.store.write_health(&snapshot)?;

        Ok(TickReport {
            snapshot,
            findings: Vec::new(),
            escalated: false,
            consecutive_failures: 0,
        })
    }

    async fn check_worker(&self, findings: &mut Vec<Finding>) -> (bool, BotStatus) {
        if self.parts.worker.is_alive().await {
            return (true, BotStatus::Running);
        }

        if let Some(reason) = self.held_reason() {
            findings.push(Finding::WorkerHeld { reason });
            return (false, BotStatus::Held);
        }

        let step = Duration::from_secs(self.config.step_timeout_secs);
        warn!("Trading worker is not running, restarting");
        let pid = match timeout(step, self.parts.worker.start()).await {
            Ok(Ok(pid)) => Some(pid),
            Ok(Err(e)) => {
                findings.push(Finding::WorkerRestartFailed {
                    detail: e.to_string(),
                });
                return (false, BotStatus::FailedRestart);
            }
            Err(_) => {
                findings.push(Finding::WorkerRestartFailed {
                    detail: format!("start did not finish within {}s", step.as_secs()),
                });
                return (false, BotStatus::FailedRestart);
            }
        };

        tokio::time::sleep(Duration::from_secs(self.config.settle_secs)).await;

        if self.parts.worker.is_alive().await {
            findings.push(Finding::WorkerRestarted { pid });
            (true, BotStatus::Restarted)
        } else {
            findings.push(Finding::WorkerRestartFailed {
                detail: format!("not alive {}s after restart", self.config.settle_secs),
            });
            (false, BotStatus::FailedRestart)
        }
    }

    /// Today's decision explicitly withheld trading
    fn held_reason(&self) -> Option<String> {
        let today = self.parts.calendar.local_date(self.parts.clock.now());
        let validation = self.parts.store.load().validation?;
        if validation.trading_day != today || validation.trading_ready {
            return None;
        }
        Some(if validation.rationale.is_empty() {
            "not trading ready".to_string()
        } else {
            validation.rationale.join("; ")
        })
    }

    async fn check_broker(&self, findings: &mut Vec<Finding>) -> Result<BrokerConnectionState> {
        let step = Duration::from_secs(self.config.step_timeout_secs);

        let check = match timeout(step, self.parts.broker.check_and_reconnect()).await {
            Ok(result) => result?,
            Err(_) => {
                let state = self.parts.broker.state().await;
                findings.push(Finding::BrokerReconnectFailed {
                    state,
                    detail: Some(format!("broker check exceeded {}s", step.as_secs())),
                });
                return Ok(state);
            }
        };

        if !check.reconnect_attempted() {
            return Ok(check.outcome);
        }

        if check.is_connected() {
            findings.push(Finding::BrokerReconnected {
                from: check.initial,
            });
        } else if check.entered_manual {
            findings.push(Finding::BrokerManualIntervention {
                detail: check.detail.clone(),
            });
        } else {
            findings.push(Finding::BrokerReconnectFailed {
                state: check.outcome,
                detail: check.detail.clone(),
            });
        }
        Ok(check.outcome)
    }

    /// Returns true when the escalation alert went out on this tick
    async fn escalate(&mut self, issues_count: u32, findings: &[Finding]) -> bool {
        if issues_count == 0 {
            self.consecutive_failures = 0;
            return false;
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures < self.config.escalation_threshold {
            return false;
        }

        let ticks = self.consecutive_failures;
        self.consecutive_failures = 0;
        self.parts
            .alerts
            .dispatch(Severity::Critical, escalation_message(ticks, findings))
            .await;
        true
    }
}
