use super::broker::BrokerConnectionState;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Market state as seen by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Open,
    /// Outside market hours, no corrective action taken
    Standby,
}

/// Worker state after one supervisor tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotStatus {
    Running,
    Stopped,
    /// Was down, restart succeeded
    Restarted,
    /// Was down, restart attempt did not bring it back
    FailedRestart,
    /// Down on purpose: today's readiness decision withheld trading
    Held,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Running => "RUNNING",
            BotStatus::Stopped => "STOPPED",
            BotStatus::Restarted => "RESTARTED",
            BotStatus::FailedRestart => "FAILED_RESTART",
            BotStatus::Held => "HELD",
        }
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time health record written once per supervisor tick
///
/// Resource fields are `None` when the tick ran in standby or a probe failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub market_status: MarketStatus,
    pub market_open: bool,
    pub bot_running: bool,
    pub bot_status: BotStatus,
    pub broker_status: BrokerConnectionState,
    pub disk_usage_pct: Option<u8>,
    pub memory_usage_pct: Option<u8>,
    pub log_size_mb: Option<u64>,
    pub issues_count: u32,
    pub last_check: DateTime<FixedOffset>,
}

impl HealthSnapshot {
    /// Snapshot for a tick outside market hours
    pub fn standby(
        bot_running: bool,
        broker_status: BrokerConnectionState,
        at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            market_status: MarketStatus::Standby,
            market_open: false,
            bot_running,
            bot_status: if bot_running {
                BotStatus::Running
            } else {
                BotStatus::Stopped
            },
            broker_status,
            disk_usage_pct: None,
            memory_usage_pct: None,
            log_size_mb: None,
            issues_count: 0,
            last_check: at,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issues_count == 0
    }
}
