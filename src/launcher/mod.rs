//! Worker Launcher
//!
//! Starts or holds the trading worker and dashboard according to the
//! morning readiness decision, and exposes start/stop/liveness to the
//! supervisor loop.

pub mod process;

pub use process::{ManagedProcess, ProcessSpec};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::domain::{ConfidenceBand, ParameterMatrix, Severity, ValidationDecision};
use crate::error::Result;
use crate::persistence::{write_json_atomic, StatusStore};
use crate::supervisor::AlertDispatcher;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Environment variable pointing the worker at its parameters
pub const PARAMS_ENV: &str = "VIGIL_PARAMS_FILE";

/// Start/stop/liveness of one supervised process
#[async_trait]
pub trait WorkerControl: Send + Sync {
    async fn is_alive(&self) -> bool;

    /// Returns the PID of the running process
    async fn start(&self) -> Result<u32>;

    async fn stop(&self) -> Result<()>;
}

/// Parameters file handed to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveParameters {
    pub trading_day: NaiveDate,
    pub confidence_score: f64,
    pub band: ConfidenceBand,
    pub strategies: ParameterMatrix,
    pub written_at: DateTime<FixedOffset>,
}

/// What `apply_decision` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchAction {
    Started {
        worker_pid: u32,
        dashboard_pid: Option<u32>,
    },
    Held {
        reason: String,
    },
}

impl LaunchAction {
    pub fn describe(&self) -> String {
        match self {
            LaunchAction::Started {
                worker_pid,
                dashboard_pid: Some(dashboard),
            } => format!("started worker (PID {}) and dashboard (PID {})", worker_pid, dashboard),
            LaunchAction::Started { worker_pid, .. } => {
                format!("started worker (PID {})", worker_pid)
            }
            LaunchAction::Held { reason } => format!("held: {}", reason),
        }
    }
}

pub struct WorkerLauncher {
    worker: Arc<dyn WorkerControl>,
    dashboard: Option<Arc<dyn WorkerControl>>,
    params_file: PathBuf,
    store: StatusStore,
    alerts: Arc<AlertDispatcher>,
    clock: Arc<dyn Clock>,
}

impl WorkerLauncher {
    pub fn new(
        worker: Arc<dyn WorkerControl>,
        dashboard: Option<Arc<dyn WorkerControl>>,
        params_file: impl Into<PathBuf>,
        store: StatusStore,
        alerts: Arc<AlertDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            worker,
            dashboard,
            params_file: params_file.into(),
            store,
            alerts,
            clock,
        }
    }

    /// Worker and dashboard as PID-file managed processes
    pub fn processes_from_config(
        config: &AppConfig,
    ) -> (Arc<ManagedProcess>, Option<Arc<ManagedProcess>>) {
        let worker_cfg = &config.worker;
        let grace = Duration::from_secs(worker_cfg.stop_grace_secs);

        let worker = ManagedProcess::new(
            ProcessSpec {
                name: "worker".to_string(),
                command: worker_cfg.command.clone(),
                working_dir: worker_cfg.working_dir.clone(),
                log_file: worker_cfg.log_file.clone(),
                env: vec![(
                    PARAMS_ENV.to_string(),
                    absolute(&worker_cfg.params_file).display().to_string(),
                )],
            },
            &worker_cfg.run_dir,
            grace,
        );

        let dashboard = worker_cfg.dashboard_command.as_ref().map(|command| {
            let log_file = worker_cfg
                .log_file
                .with_file_name("dashboard.log");
            Arc::new(ManagedProcess::new(
                ProcessSpec {
                    name: "dashboard".to_string(),
                    command: command.clone(),
                    working_dir: worker_cfg.working_dir.clone(),
                    log_file,
                    env: Vec::new(),
                },
                &worker_cfg.run_dir,
                grace,
            ))
        });

        (Arc::new(worker), dashboard)
    }

    pub fn worker(&self) -> Arc<dyn WorkerControl> {
        self.worker.clone()
    }

    /// Start the worker with the adjusted parameters, or leave it stopped
    pub async fn apply_decision(&self, decision: &ValidationDecision) -> Result<LaunchAction> {
        let action = if decision.trading_ready {
            let params = ActiveParameters {
                trading_day: decision.trading_day,
                confidence_score: decision.confidence_score,
                band: decision.band,
                strategies: decision.adjusted_parameters.clone(),
                written_at: self.clock.now(),
            };
            write_json_atomic(&self.params_file, &params)?;

            let worker_pid = self.worker.start().await?;
            let dashboard_pid = match self.dashboard {
                Some(ref dashboard) => Some(dashboard.start().await?),
                None => None,
            };

            let action = LaunchAction::Started {
                worker_pid,
                dashboard_pid,
            };
            self.alerts
                .dispatch(
                    Severity::Info,
                    format!(
                        "Trading enabled for {}: confidence {:.2} ({} band), {}",
                        decision.trading_day,
                        decision.confidence_score,
                        decision.band,
                        action.describe()
                    ),
                )
                .await;
            action
        } else {
            self.worker.stop().await?;

            let reason = if decision.rationale.is_empty() {
                "not trading ready".to_string()
            } else {
                decision.rationale.join("; ")
            };
            self.alerts
                .dispatch(
                    Severity::High,
                    format!(
                        "Trading withheld for {}: {}",
                        decision.trading_day, reason
                    ),
                )
                .await;
            LaunchAction::Held { reason }
        };

        info!("Launch decision for {}: {}", decision.trading_day, action.describe());
        self.record(decision.trading_day, &action)?;
        Ok(action)
    }

    /// Stop the worker, then the dashboard
    pub async fn stop_all(&self) -> Result<()> {
        self.worker.stop().await?;
        if let Some(ref dashboard) = self.dashboard {
            dashboard.stop().await?;
        }
        Ok(())
    }

    fn record(&self, trading_day: NaiveDate, action: &LaunchAction) -> Result<()> {
        let Some(mut summary) = self.store.load().validation else {
            return Ok(());
        };
        if summary.trading_day != trading_day {
            return Ok(());
        }
        summary.launch_action = Some(action.describe());
        self.store.write_validation(&summary)
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
