//! Wiring shared by the CLI commands

use crate::adapters::notifiers_from_config;
use crate::broker::{session_for, BrokerMonitor};
use crate::clock::{Clock, MarketCalendar, SystemClock};
use crate::config::AppConfig;
use crate::error::{Result, VigilError};
use crate::launcher::{WorkerControl, WorkerLauncher};
use crate::persistence::StatusStore;
use crate::scheduler::{
    intelligence_from_config, ArtifactStore, CommandSearch, EveningJob, JobRunner, MorningJob,
    ValidationPolicy,
};
use crate::supervisor::{
    AlertDispatcher, AlertDispatcherConfig, Supervisor, SupervisorParts, SystemResources,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Rate bucket shared by every vigil process
pub const ALERT_BUCKET_FILE: &str = "alert_rate_bucket.json";

/// Validated configuration plus the collaborators every command needs
pub struct Runtime {
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
    pub calendar: MarketCalendar,
    pub store: StatusStore,
    pub alerts: Arc<AlertDispatcher>,
}

impl Runtime {
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config = AppConfig::load_from(config_dir)?;
        if let Err(errors) = config.validate() {
            return Err(VigilError::InvalidConfig(errors.join("; ")));
        }
        Self::from_config(config)
    }

    pub fn from_config(config: AppConfig) -> Result<Self> {
        let calendar = MarketCalendar::from_config(&config.market)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(calendar.offset()));
        let store = StatusStore::new(&config.paths.status_file);

        let alerts = Arc::new(AlertDispatcher::new(
            AlertDispatcherConfig {
                ceiling_per_hour: config.alerts.ceiling_per_hour,
                log_path: config.alerts.log_file.clone(),
                bucket_path: Some(config.paths.state_dir.join(ALERT_BUCKET_FILE)),
                channel_timeout: Duration::from_secs(config.alerts.channel_timeout_secs),
            },
            clock.clone(),
            notifiers_from_config(&config.alerts),
        ));
        debug!("Runtime ready (broker: {})", config.broker.kind);

        Ok(Self {
            config,
            clock,
            calendar,
            store,
            alerts,
        })
    }

    pub fn broker_monitor(&self) -> Result<Arc<BrokerMonitor>> {
        let session = session_for(&self.config)?;
        Ok(Arc::new(BrokerMonitor::new(
            session,
            self.store.clone(),
            self.clock.clone(),
            &self.config.paths.state_dir,
        )))
    }

    pub fn launcher(&self) -> WorkerLauncher {
        let (worker, dashboard) = WorkerLauncher::processes_from_config(&self.config);
        WorkerLauncher::new(
            worker,
            dashboard.map(|d| d as Arc<dyn WorkerControl>),
            &self.config.worker.params_file,
            self.store.clone(),
            self.alerts.clone(),
            self.clock.clone(),
        )
    }

    pub fn supervisor(&self) -> Result<Supervisor> {
        let launcher = self.launcher();
        let parts = SupervisorParts {
            calendar: self.calendar.clone(),
            clock: self.clock.clone(),
            worker: launcher.worker(),
            broker: self.broker_monitor()?,
            resources: Arc::new(SystemResources::new(
                &self.config.thresholds.disk_path,
                &self.config.worker.log_file,
            )),
            alerts: self.alerts.clone(),
            store: self.store.clone(),
        };
        Ok(Supervisor::new(
            self.config.supervisor.clone(),
            self.config.thresholds.clone(),
            parts,
        ))
    }

    pub fn job_runner(&self) -> JobRunner {
        JobRunner::new(
            self.calendar.clone(),
            self.clock.clone(),
            &self.config.worker.run_dir,
        )
    }

    pub fn evening_job(&self) -> EveningJob {
        let scheduler = &self.config.scheduler;
        EveningJob::new(
            scheduler.strategies.clone(),
            Arc::new(CommandSearch::new(
                scheduler.optimizer.command.clone(),
                self.config.worker.working_dir.clone(),
            )),
            ArtifactStore::new(&scheduler.artifact_dir),
            Duration::from_secs(scheduler.optimizer.total_timeout_secs),
        )
    }

    pub fn morning_job(&self) -> Result<MorningJob> {
        let scheduler = &self.config.scheduler;
        let broker = if scheduler.probe_broker {
            Some(self.broker_monitor()?)
        } else {
            None
        };

        Ok(MorningJob::new(
            ValidationPolicy::from_config(scheduler),
            intelligence_from_config(scheduler, self.config.worker.working_dir.clone())?,
            ArtifactStore::new(&scheduler.artifact_dir),
            broker,
            self.store.clone(),
            self.alerts.clone(),
        ))
    }
}
