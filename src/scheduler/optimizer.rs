//! Evening job: full parameter search over the strategy × symbol matrix

use super::artifacts::ArtifactStore;
use crate::config::StrategySpec;
use crate::domain::{OptimizationParameterSet, ParameterMatrix, StrategyParams};
use crate::error::{Result, VigilError};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Optimizes one matrix cell
#[async_trait]
pub trait ParameterSearch: Send + Sync {
    async fn optimize(&self, strategy: &StrategySpec, symbol: &str) -> Result<StrategyParams>;
}

/// Runs the external optimizer once per cell and reads JSON parameters
/// from its stdout
#[derive(Debug, Clone)]
pub struct CommandSearch {
    command: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandSearch {
    pub fn new(command: Vec<String>, working_dir: Option<PathBuf>) -> Self {
        Self {
            command,
            working_dir,
        }
    }
}

#[async_trait]
impl ParameterSearch for CommandSearch {
    async fn optimize(&self, strategy: &StrategySpec, symbol: &str) -> Result<StrategyParams> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| VigilError::InvalidConfig("optimizer command is empty".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg("--strategy")
            .arg(&strategy.name)
            .arg("--symbol")
            .arg(symbol)
            .arg("--timeframe")
            .arg(strategy.timeframe_min.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The caller's timeout drops this future; take the child with it
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| VigilError::Optimization(format!("failed to run optimizer: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VigilError::Optimization(format!(
                "optimizer exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_params(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Whole stdout as JSON, else the last line that parses
fn parse_params(stdout: &str) -> Result<StrategyParams> {
    if let Ok(params) = serde_json::from_str::<StrategyParams>(stdout.trim()) {
        return Ok(params);
    }

    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<StrategyParams>(line).ok())
        .ok_or_else(|| {
            VigilError::Optimization("optimizer printed no parameter JSON".to_string())
        })
}

/// Summary of one evening run
#[derive(Debug, Clone)]
pub struct EveningReport {
    pub trading_day: NaiveDate,
    pub artifact: PathBuf,
    pub cells_optimized: usize,
    pub failed_cells: Vec<String>,
    pub fingerprint: String,
}

pub struct EveningJob {
    strategies: Vec<StrategySpec>,
    search: Arc<dyn ParameterSearch>,
    artifacts: ArtifactStore,
    budget: Duration,
}

impl EveningJob {
    pub fn new(
        strategies: Vec<StrategySpec>,
        search: Arc<dyn ParameterSearch>,
        artifacts: ArtifactStore,
        budget: Duration,
    ) -> Self {
        Self {
            strategies,
            search,
            artifacts,
            budget,
        }
    }

    /// Optimize every cell within the run budget and write the artifact
    ///
    /// Failed cells are recorded; the run fails, writing nothing, only when
    /// no cell succeeds.
    pub async fn run_evening(
        &self,
        trading_day: NaiveDate,
        now: DateTime<FixedOffset>,
    ) -> Result<EveningReport> {
        let total: usize = self.strategies.iter().map(|s| s.symbols.len()).sum();
        if total == 0 {
            return Err(VigilError::InvalidConfig(
                "no strategies configured for optimization".to_string(),
            ));
        }
        info!("Evening optimization for {}: {} cells", trading_day, total);

        let deadline = Instant::now() + self.budget;
        let mut matrix = ParameterMatrix::new();
        let mut failed_cells = Vec::new();

        for strategy in &self.strategies {
            for symbol in &strategy.symbols {
                let cell = format!("{}/{}", strategy.name, symbol);
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    warn!("Optimization budget exhausted before {}", cell);
                    failed_cells.push(cell);
                    continue;
                }

                match tokio::time::timeout(remaining, self.search.optimize(strategy, symbol)).await
                {
                    Ok(Ok(params)) => {
                        debug!("Optimized {} (score {:.3})", cell, params.optimization_score);
                        matrix
                            .entry(strategy.name.clone())
                            .or_default()
                            .insert(symbol.clone(), params);
                    }
                    Ok(Err(e)) => {
                        warn!("Optimization failed for {}: {}", cell, e);
                        failed_cells.push(cell);
                    }
                    Err(_) => {
                        warn!("Optimization budget exhausted during {}", cell);
                        failed_cells.push(cell);
                    }
                }
            }
        }

        let set = OptimizationParameterSet {
            trading_day,
            generated_at: now,
            strategies: matrix,
            failed_cells,
        };

        if set.is_empty() {
            return Err(VigilError::Optimization(format!(
                "all {} cells failed for {}",
                total, trading_day
            )));
        }

        let artifact = self.artifacts.save(&set)?;
        info!(
            "Wrote {} ({} cells, {} failed)",
            artifact.display(),
            set.cell_count(),
            set.failed_cells.len()
        );

        Ok(EveningReport {
            trading_day,
            artifact,
            cells_optimized: set.cell_count(),
            failed_cells: set.failed_cells.clone(),
            fingerprint: set.fingerprint(),
        })
    }
}
