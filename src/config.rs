use crate::domain::BrokerKind;
use crate::scheduler::confidence::MIN_TRADING_CONFIDENCE;
use chrono::{NaiveDate, NaiveTime};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Session open, local time ("HH:MM")
    pub open: String,
    /// Session close, local time ("HH:MM")
    pub close: String,
    /// Market timezone as an offset from UTC in minutes (IST = 330)
    pub utc_offset_minutes: i32,
    /// Weekdays the market trades ("Mon".."Sun")
    pub trading_days: Vec<String>,
    /// Exchange holidays
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            open: "09:15".to_string(),
            close: "15:30".to_string(),
            utc_offset_minutes: 330,
            trading_days: ["Mon", "Tue", "Wed", "Thu", "Fri"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            holidays: Vec::new(),
        }
    }
}

impl MarketConfig {
    pub fn open_time(&self) -> Result<NaiveTime, String> {
        parse_hhmm(&self.open).map_err(|e| format!("market.open: {e}"))
    }

    pub fn close_time(&self) -> Result<NaiveTime, String> {
        parse_hhmm(&self.close).map_err(|e| format!("market.close: {e}"))
    }
}

fn parse_hhmm(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| format!("'{value}' is not HH:MM"))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Seconds between ticks
    pub poll_interval_secs: u64,
    /// Wait after a restart before re-checking liveness
    pub settle_secs: u64,
    /// Upper bound for a single restart/reconnect step
    pub step_timeout_secs: u64,
    /// Consecutive ticks with issues before a CRITICAL escalation
    pub escalation_threshold: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            settle_secs: 5,
            step_timeout_secs: 20,
            escalation_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Disk usage percentage above which an issue is raised
    pub disk_pct: u8,
    /// Memory usage percentage above which an issue is raised
    pub memory_pct: u8,
    /// Worker log size in MB above which an issue is raised
    pub log_mb: u64,
    /// Filesystem to measure disk usage on
    pub disk_path: PathBuf,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            disk_pct: 90,
            memory_pct: 85,
            log_mb: 100,
            disk_path: PathBuf::from("/"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Notification ceiling per hour; the alert log is never limited
    pub ceiling_per_hour: u32,
    /// Append-only alert log
    pub log_file: PathBuf,
    /// Webhook endpoint (disabled when unset)
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Desktop notifications via notify-send
    pub desktop: bool,
    /// Audible alarm for CRITICAL alerts
    pub audio: bool,
    /// Player used for the audible alarm
    pub audio_command: String,
    #[serde(default)]
    pub audio_file: Option<PathBuf>,
    /// Upper bound for a single channel call
    pub channel_timeout_secs: u64,
    /// Name shown in notifications and webhook payloads
    pub system_name: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            ceiling_per_hour: 10,
            log_file: PathBuf::from("logs/alerts.log"),
            webhook_url: None,
            desktop: true,
            audio: true,
            audio_command: "paplay".to_string(),
            audio_file: Some(PathBuf::from(
                "/usr/share/sounds/freedesktop/stereo/alarm-clock-elapsed.oga",
            )),
            channel_timeout_secs: 10,
            system_name: "PaperTradingBot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub kind: BrokerKind,
    /// Where the Kite access token is persisted after login
    pub token_file: PathBuf,
    pub kite_api_url: String,
    pub smartapi_url: String,
    pub request_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: BrokerKind::Zerodha,
            token_file: PathBuf::from("state/zerodha_access_token"),
            kite_api_url: "https://api.kite.trade".to_string(),
            smartapi_url: "https://apiconnect.angelbroking.com".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// One row of the evening optimization matrix
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StrategySpec {
    pub name: String,
    pub symbols: Vec<String>,
    /// Candle timeframe in minutes
    #[serde(default = "default_timeframe")]
    pub timeframe_min: u32,
}

fn default_timeframe() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Confidence required for trading_ready
    pub min_confidence: f64,
    /// Confidence assigned when validating without intelligence
    pub degraded_confidence: f64,
    /// Bound on the intelligence fetch
    pub intelligence_timeout_secs: u64,
    /// Directory holding dated parameter artifacts
    pub artifact_dir: PathBuf,
    /// Latest validation decision
    pub decision_file: PathBuf,
    /// Written when the morning job fails completely
    pub failure_report_file: PathBuf,
    /// Probe the broker before deciding readiness
    pub probe_broker: bool,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub intelligence: IntelligenceConfig,
    #[serde(default)]
    pub strategies: Vec<StrategySpec>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.4,
            degraded_confidence: 0.5,
            intelligence_timeout_secs: 120,
            artifact_dir: PathBuf::from("state/artifacts"),
            decision_file: PathBuf::from("state/validation_decision.json"),
            failure_report_file: PathBuf::from("state/validation_failure.json"),
            probe_broker: true,
            optimizer: OptimizerConfig::default(),
            intelligence: IntelligenceConfig::default(),
            strategies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// External optimizer; receives `--strategy`, `--symbol`, `--timeframe`
    pub command: Vec<String>,
    /// Budget for the whole evening run
    pub total_timeout_secs: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string(), "retrain_optimizer.py".to_string()],
            total_timeout_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntelligenceConfig {
    /// Report file written by the pre-market generator
    #[serde(default)]
    pub report_file: Option<PathBuf>,
    /// Generator command printing the report on stdout
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

impl Default for IntelligenceConfig {
    fn default() -> Self {
        Self {
            report_file: Some(PathBuf::from("state/premarket_intelligence.json")),
            command: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Trading worker command line
    pub command: Vec<String>,
    /// Dashboard command line (not managed when unset)
    #[serde(default)]
    pub dashboard_command: Option<Vec<String>>,
    /// Directory for PID files
    pub run_dir: PathBuf,
    /// Worker stdout/stderr, also measured by the log-size check
    pub log_file: PathBuf,
    /// Working directory for spawned processes
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// SIGTERM grace period before SIGKILL
    pub stop_grace_secs: u64,
    /// Adjusted parameters handed to the worker
    pub params_file: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string(), "main_papertrader.py".to_string()],
            dashboard_command: None,
            run_dir: PathBuf::from("state/run"),
            log_file: PathBuf::from("logs/worker.log"),
            working_dir: None,
            stop_grace_secs: 10,
            params_file: PathBuf::from("state/active_parameters.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Durable state (rate bucket, notices, sessions)
    pub state_dir: PathBuf,
    /// Status store read by dashboards
    pub status_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            status_file: PathBuf::from("state/system_status.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the rolling vigil.log
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: default_log_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// File written by `vigil broker select`
pub const BROKER_SELECTION_FILE: &str = "broker.toml";

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("VIGIL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Broker selection persisted by the CLI
            .add_source(File::from(config_dir.join(BROKER_SELECTION_FILE)).required(false))
            // Override with environment variables (VIGIL_SUPERVISOR__POLL_INTERVAL_SECS, etc.)
            .add_source(
                Environment::with_prefix("VIGIL")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let open = self.market.open_time();
        let close = self.market.close_time();
        match (&open, &close) {
            (Ok(open), Ok(close)) if open >= close => {
                errors.push(format!(
                    "market.open ({open}) must be before market.close ({close})"
                ));
            }
            _ => {}
        }
        for result in [open, close] {
            if let Err(e) = result {
                errors.push(e);
            }
        }

        if self.market.utc_offset_minutes.abs() >= 24 * 60 {
            errors.push("market.utc_offset_minutes must be within +/- 24h".to_string());
        }

        for day in &self.market.trading_days {
            if day.parse::<chrono::Weekday>().is_err() {
                errors.push(format!("market.trading_days: unknown weekday '{day}'"));
            }
        }

        if self.supervisor.poll_interval_secs == 0 {
            errors.push("supervisor.poll_interval_secs must be positive".to_string());
        }

        // A tick must finish before the next one is due
        let worst_tick = self.supervisor.settle_secs + 2 * self.supervisor.step_timeout_secs;
        if worst_tick >= self.supervisor.poll_interval_secs {
            errors.push(format!(
                "worst-case tick ({worst_tick}s) must be shorter than poll_interval_secs ({}s)",
                self.supervisor.poll_interval_secs
            ));
        }

        if self.supervisor.escalation_threshold == 0 {
            errors.push("supervisor.escalation_threshold must be positive".to_string());
        }

        if self.thresholds.disk_pct == 0 || self.thresholds.disk_pct > 100 {
            errors.push("thresholds.disk_pct must be in 1..=100".to_string());
        }

        if self.thresholds.memory_pct == 0 || self.thresholds.memory_pct > 100 {
            errors.push("thresholds.memory_pct must be in 1..=100".to_string());
        }

        if self.alerts.ceiling_per_hour == 0 {
            errors.push("alerts.ceiling_per_hour must be positive".to_string());
        }

        if let Some(ref url) = self.alerts.webhook_url {
            if url::Url::parse(url).is_err() {
                errors.push(format!("alerts.webhook_url is not a valid URL: {url}"));
            }
        }

        for (name, value) in [
            ("scheduler.min_confidence", self.scheduler.min_confidence),
            ("scheduler.degraded_confidence", self.scheduler.degraded_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{name} must be within [0, 1]"));
            }
        }
        if self.scheduler.min_confidence < MIN_TRADING_CONFIDENCE {
            errors.push(format!(
                "scheduler.min_confidence must be at least {MIN_TRADING_CONFIDENCE}"
            ));
        }

        if self.scheduler.optimizer.command.is_empty() {
            errors.push("scheduler.optimizer.command must not be empty".to_string());
        }

        let intelligence = &self.scheduler.intelligence;
        if intelligence.report_file.is_none()
            && intelligence.command.as_ref().map_or(true, |c| c.is_empty())
        {
            errors.push("scheduler.intelligence needs report_file or a non-empty command".to_string());
        }

        for strategy in &self.scheduler.strategies {
            if strategy.symbols.is_empty() {
                errors.push(format!("strategy '{}' has no symbols", strategy.name));
            }
        }

        if self.worker.command.is_empty() {
            errors.push("worker.command must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.supervisor.poll_interval_secs, 60);
        assert_eq!(config.alerts.ceiling_per_hour, 10);
        assert_eq!(config.scheduler.min_confidence, 0.4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = AppConfig::default();
        config.market.open = "16:00".to_string();
        config.alerts.ceiling_per_hour = 0;
        config.scheduler.min_confidence = 1.5;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("market.open")));
    }

    #[test]
    fn test_min_confidence_cannot_go_below_trading_floor() {
        let mut config = AppConfig::default();
        config.scheduler.min_confidence = 0.3;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("scheduler.min_confidence must be at least 0.4"));
    }

    #[test]
    fn test_tick_budget_must_fit_poll_interval() {
        let mut config = AppConfig::default();
        config.supervisor.poll_interval_secs = 30;
        config.supervisor.step_timeout_secs = 20;

        let errors = config.validate().unwrap_err();
        assert!(errors[0].contains("worst-case tick"));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
[supervisor]
poll_interval_secs = 90
settle_secs = 5
step_timeout_secs = 30
escalation_threshold = 3

[[scheduler.strategies]]
name = "AlphaOneStrategy"
symbols = ["RELIANCE", "TCS"]
timeframe_min = 15
"#,
        )
        .unwrap();
        std::fs::write(dir.path().join(BROKER_SELECTION_FILE), "[broker]\nkind = \"angelone\"\n")
            .unwrap();

        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.supervisor.poll_interval_secs, 90);
        assert_eq!(config.broker.kind, BrokerKind::AngelOne);
        assert_eq!(config.scheduler.strategies[0].symbols.len(), 2);
        // Untouched sections keep their defaults
        assert_eq!(config.thresholds.disk_pct, 90);
    }
}
