//! Optimization/Validation Scheduler
//!
//! Two jobs per trading day. The evening job searches parameters for the
//! whole strategy × symbol matrix and writes a dated artifact; the morning
//! job scores pre-market intelligence against the newest artifact and
//! decides whether the worker may trade.

pub mod artifacts;
pub mod confidence;
pub mod intelligence;
pub mod jobs;
pub mod optimizer;
pub mod validation;

pub use artifacts::ArtifactStore;
pub use confidence::{adjust_parameters, confidence_score};
pub use intelligence::{CommandIntelligence, FileIntelligence, IntelligenceSource};
pub use jobs::{JobKind, JobRunner, JOB_LOCK_FILE};
pub use optimizer::{CommandSearch, EveningJob, EveningReport, ParameterSearch};
pub use validation::{decide, FailureReport, MorningJob, ValidationPolicy};

use crate::config::SchedulerConfig;
use crate::error::{Result, VigilError};
use std::path::PathBuf;
use std::sync::Arc;

/// Intelligence source from configuration; a configured command wins over
/// the report file
pub fn intelligence_from_config(
    config: &SchedulerConfig,
    working_dir: Option<PathBuf>,
) -> Result<Arc<dyn IntelligenceSource>> {
    if let Some(ref command) = config.intelligence.command {
        return Ok(Arc::new(CommandIntelligence::new(command.clone(), working_dir)));
    }
    if let Some(ref path) = config.intelligence.report_file {
        return Ok(Arc::new(FileIntelligence::new(path.clone())));
    }
    Err(VigilError::InvalidConfig(
        "scheduler.intelligence needs report_file or command".to_string(),
    ))
}
