//! Day-phase gating and mutual exclusion for the scheduled jobs

use super::optimizer::{EveningJob, EveningReport};
use super::validation::MorningJob;
use crate::clock::{Clock, DayPhase, MarketCalendar};
use crate::domain::ValidationDecision;
use crate::error::{Result, VigilError};
use crate::persistence::PidLock;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Lock shared by the evening and morning jobs
pub const JOB_LOCK_FILE: &str = "jobs.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Evening,
    Morning,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Evening => "evening",
            JobKind::Morning => "morning",
        }
    }

    pub fn allowed_in(&self, phase: DayPhase) -> bool {
        match self {
            JobKind::Evening => matches!(phase, DayPhase::PostClose | DayPhase::NonTradingDay),
            JobKind::Morning => matches!(phase, DayPhase::PreOpen),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runs one job at a time, only in its day phase unless forced
pub struct JobRunner {
    calendar: MarketCalendar,
    clock: Arc<dyn Clock>,
    lock_path: PathBuf,
}

impl JobRunner {
    pub fn new(calendar: MarketCalendar, clock: Arc<dyn Clock>, run_dir: &Path) -> Self {
        Self {
            calendar,
            clock,
            lock_path: run_dir.join(JOB_LOCK_FILE),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Phase check, then the job lock; the lock is held until the guard drops
    pub fn begin(&self, kind: JobKind, force: bool) -> Result<PidLock> {
        let phase = self.calendar.phase(self.clock.now());
        if !kind.allowed_in(phase) {
            if !force {
                return Err(VigilError::WrongPhase(format!(
                    "{} job cannot run during {}",
                    kind,
                    phase.as_str()
                )));
            }
            warn!("Forcing {} job during {}", kind, phase.as_str());
        }
        PidLock::acquire(&self.lock_path)
    }

    pub async fn evening(&self, job: &EveningJob, force: bool) -> Result<EveningReport> {
        let _lock = self.begin(JobKind::Evening, force)?;
        let now = self.clock.now();
        let trading_day = self.calendar.local_date(now);

        match job.run_evening(trading_day, now).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(
                    "Evening optimization failed, the morning job will fall back to the last valid artifact: {}",
                    e
                );
                Err(e)
            }
        }
    }

    pub async fn morning(&self, job: &MorningJob, force: bool) -> Result<ValidationDecision> {
        let _lock = self.begin(JobKind::Morning, force)?;
        let now = self.clock.now();
        let decision = job.run_morning(self.calendar.local_date(now), now).await?;
        info!("Morning job finished for {}", decision.trading_day);
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::MarketConfig;
    use chrono::{FixedOffset, TimeZone};

    fn runner(dir: &Path, h: u32, m: u32) -> JobRunner {
        let calendar = MarketCalendar::from_config(&MarketConfig::default()).unwrap();
        // 2026-10-19 is a Monday
        let now = FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 19, h, m, 0)
            .unwrap();
        JobRunner::new(calendar, Arc::new(FixedClock::new(now)), dir)
    }

    #[test]
    fn test_phase_gate() {
        assert!(JobKind::Morning.allowed_in(DayPhase::PreOpen));
        assert!(!JobKind::Morning.allowed_in(DayPhase::Open));
        assert!(JobKind::Evening.allowed_in(DayPhase::PostClose));
        assert!(JobKind::Evening.allowed_in(DayPhase::NonTradingDay));
        assert!(!JobKind::Evening.allowed_in(DayPhase::PreOpen));
    }

    #[test]
    fn test_wrong_phase_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path(), 11, 0);

        let err = runner.begin(JobKind::Morning, false).unwrap_err();
        assert!(matches!(err, VigilError::WrongPhase(_)));
        assert_eq!(err.exit_code(), 4);

        let lock = runner.begin(JobKind::Morning, true).unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn test_job_lock_held_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path(), 8, 30);

        // Another live process (init) holds the lock
        std::fs::write(runner.lock_path(), "1").unwrap();
        let err = runner.begin(JobKind::Evening, true).unwrap_err();
        assert!(matches!(err, VigilError::AlreadyRunning { .. }));
    }
}
