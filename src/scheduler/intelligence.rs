//! Pre-market intelligence sources
//!
//! The generator is external; reports are accepted either flat or in the
//! generator's nested layout (`news_sentiment.sentiment_category`,
//! `global_markets.global_bias`, `risk_assessment.{risk_level,risk_score}`,
//! `trading_recommendations`).

use crate::domain::{Bias, IntelligenceReport, Recommendations, RiskLevel};
use crate::error::{Result, VigilError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait IntelligenceSource: Send + Sync {
    async fn fetch(&self) -> Result<IntelligenceReport>;
}

/// Report file written by the generator
#[derive(Debug, Clone)]
pub struct FileIntelligence {
    path: PathBuf,
}

impl FileIntelligence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl IntelligenceSource for FileIntelligence {
    async fn fetch(&self) -> Result<IntelligenceReport> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            VigilError::IntelligenceUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        debug!("Read intelligence report from {}", self.path.display());
        parse_report(&content)
    }
}

/// Generator run on demand, report on stdout
#[derive(Debug, Clone)]
pub struct CommandIntelligence {
    command: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandIntelligence {
    pub fn new(command: Vec<String>, working_dir: Option<PathBuf>) -> Self {
        Self {
            command,
            working_dir,
        }
    }
}

#[async_trait]
impl IntelligenceSource for CommandIntelligence {
    async fn fetch(&self) -> Result<IntelligenceReport> {
        let (program, args) = self.command.split_first().ok_or_else(|| {
            VigilError::InvalidConfig("intelligence command is empty".to_string())
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|e| {
            VigilError::IntelligenceUnavailable(format!("failed to run generator: {}", e))
        })?;
        if !output.status.success() {
            return Err(VigilError::IntelligenceUnavailable(format!(
                "generator exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_report(&String::from_utf8_lossy(&output.stdout))
    }
}

#[derive(Deserialize)]
struct NestedReport {
    news_sentiment: NestedSentiment,
    global_markets: NestedGlobal,
    risk_assessment: NestedRisk,
    #[serde(default)]
    trading_recommendations: Recommendations,
}

#[derive(Deserialize)]
struct NestedSentiment {
    sentiment_category: Bias,
}

#[derive(Deserialize)]
struct NestedGlobal {
    global_bias: Bias,
}

#[derive(Deserialize)]
struct NestedRisk {
    risk_level: RiskLevel,
    risk_score: f64,
}

/// Accept the flat or the nested layout and check the score range
pub fn parse_report(content: &str) -> Result<IntelligenceReport> {
    let report = match serde_json::from_str::<IntelligenceReport>(content) {
        Ok(report) => report,
        Err(flat_err) => match serde_json::from_str::<NestedReport>(content) {
            Ok(nested) => IntelligenceReport {
                sentiment_category: nested.news_sentiment.sentiment_category,
                global_bias: nested.global_markets.global_bias,
                risk_level: nested.risk_assessment.risk_level,
                risk_score: nested.risk_assessment.risk_score,
                recommendations: nested.trading_recommendations,
            },
            Err(_) => {
                return Err(VigilError::IntelligenceUnavailable(format!(
                    "unrecognized report: {}",
                    flat_err
                )))
            }
        },
    };

    if !(0.0..=100.0).contains(&report.risk_score) {
        return Err(VigilError::IntelligenceUnavailable(format!(
            "risk_score {} outside 0-100",
            report.risk_score
        )));
    }
    Ok(report)
}
