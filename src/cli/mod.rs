//! Vigil CLI
//!
//! Commands:
//! - `vigil supervise` - Run the supervisor loop
//! - `vigil evening` / `vigil morning` - Scheduled optimize and validate jobs
//! - `vigil launch` / `vigil stop` - Worker control
//! - `vigil status` - Status store and recent alerts
//! - `vigil broker` - Broker probe and selection

pub mod broker;
pub mod output;
pub mod runtime;
pub mod status;

pub use broker::BrokerCommands;
pub use runtime::Runtime;

use crate::domain::ValidationDecision;
use crate::error::{Result, VigilError};
use crate::persistence::{read_json, PidLock};
use clap::{Parser, Subcommand};
use output::{print_error, print_success, print_warn, OutputMode};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::info;

/// Single-instance lock for the supervisor loop
pub const SUPERVISOR_LOCK_FILE: &str = "supervisor.pid";

/// Market-hours trading supervisor
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about = "Unattended supervisor and optimize/validate scheduler for a trading worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml, <VIGIL_ENV>.toml and broker.toml
    #[arg(long, global = true, default_value = "config")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the supervisor loop until SIGINT/SIGTERM
    Supervise,

    /// Run the evening optimization job
    Evening {
        /// Run outside the post-close phase
        #[arg(long)]
        force: bool,
    },

    /// Run the morning validation job and apply its decision
    Morning {
        /// Run outside the pre-open phase
        #[arg(long)]
        force: bool,

        /// Record the decision without starting or stopping the worker
        #[arg(long)]
        no_launch: bool,
    },

    /// Apply the most recent validation decision
    Launch,

    /// Stop the worker and dashboard
    Stop,

    /// Show the status store and recent alerts
    Status {
        /// Number of alert log lines to show
        #[arg(short = 'n', long, default_value = "5")]
        lines: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Broker connectivity
    #[command(subcommand)]
    Broker(BrokerCommands),
}

impl Commands {
    /// Commands that print a result and exit; they log at WARN only
    pub fn is_one_shot(&self) -> bool {
        matches!(
            self,
            Commands::Status { .. } | Commands::Broker(BrokerCommands::Select { .. })
        )
    }
}

impl Cli {
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let config_dir = self.config_dir;
        match self.command {
            Commands::Supervise => supervise(&config_dir, shutdown).await,
            Commands::Evening { force } => evening(&config_dir, force).await,
            Commands::Morning { force, no_launch } => morning(&config_dir, force, no_launch).await,
            Commands::Launch => launch(&config_dir).await,
            Commands::Stop => {
                let runtime = Runtime::load(&config_dir)?;
                runtime.launcher().stop_all().await?;
                print_success("Worker stopped");
                Ok(())
            }
            Commands::Status { lines, json } => {
                let runtime = Runtime::load(&config_dir)?;
                status::render(
                    &runtime.store.load(),
                    &runtime.config.alerts.log_file,
                    lines,
                    OutputMode::from_json_flag(json),
                )?;
                Ok(())
            }
            Commands::Broker(cmd) => cmd.run(&config_dir).await,
        }
    }
}

async fn supervise<F>(config_dir: &Path, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let runtime = Runtime::load(config_dir)?;
    let _lock = PidLock::acquire(runtime.config.worker.run_dir.join(SUPERVISOR_LOCK_FILE))?;
    info!("Supervising {:?}", runtime.config.worker.command);

    runtime.supervisor()?.run(shutdown).await
}

async fn evening(config_dir: &Path, force: bool) -> Result<()> {
    let runtime = Runtime::load(config_dir)?;
    let report = runtime
        .job_runner()
        .evening(&runtime.evening_job(), force)
        .await?;

    print_success(&format!(
        "Optimized {} cells for {} -> {}",
        report.cells_optimized,
        report.trading_day,
        report.artifact.display()
    ));
    if !report.failed_cells.is_empty() {
        print_warn(&format!("Failed cells: {}", report.failed_cells.join(", ")));
    }
    Ok(())
}

async fn morning(config_dir: &Path, force: bool, no_launch: bool) -> Result<()> {
    let runtime = Runtime::load(config_dir)?;
    let job = runtime.morning_job()?;
    let decision = runtime.job_runner().morning(&job, force).await?;
    print_decision(&decision);

    if !no_launch {
        let action = runtime.launcher().apply_decision(&decision).await?;
        println!("{}", action.describe());
    }
    runtime.alerts.flush().await;
    Ok(())
}

async fn launch(config_dir: &Path) -> Result<()> {
    let runtime = Runtime::load(config_dir)?;
    let decision_file = &runtime.config.scheduler.decision_file;
    let decision: ValidationDecision = read_json(decision_file)?.ok_or_else(|| {
        VigilError::ArtifactUnavailable(format!(
            "no validation decision at {}",
            decision_file.display()
        ))
    })?;

    let today = runtime.calendar.local_date(runtime.clock.now());
    if decision.trading_day != today {
        print_warn(&format!(
            "Decision is for {}, today is {}",
            decision.trading_day, today
        ));
    }

    print_decision(&decision);
    let action = runtime.launcher().apply_decision(&decision).await?;
    println!("{}", action.describe());
    runtime.alerts.flush().await;
    Ok(())
}

fn print_decision(decision: &ValidationDecision) {
    let headline = format!(
        "{}: confidence {:.2} ({} band, {:?})",
        decision.trading_day, decision.confidence_score, decision.band, decision.source
    );
    if decision.trading_ready {
        print_success(&format!("Trading ready for {headline}"));
    } else {
        print_error(&format!("Trading withheld for {headline}"));
    }
    for line in &decision.rationale {
        println!("  - {line}");
    }
}
