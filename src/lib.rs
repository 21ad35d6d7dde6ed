pub mod adapters;
pub mod broker;
pub mod cli;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod launcher;
pub mod persistence;
pub mod scheduler;
pub mod supervisor;

pub use broker::{BrokerCheck, BrokerMonitor, BrokerSession, ProbeFailure, Remediation};
pub use clock::{Clock, DayPhase, FixedClock, MarketCalendar, SystemClock};
pub use config::AppConfig;
pub use error::{Result, VigilError};
pub use launcher::{LaunchAction, WorkerControl, WorkerLauncher};
pub use persistence::{PidLock, StatusRecord, StatusStore};
pub use scheduler::{EveningJob, JobRunner, MorningJob, ValidationPolicy};
pub use supervisor::{
    AlertDispatcher, AlertDispatcherConfig, Supervisor, SupervisorParts, TickReport,
};
