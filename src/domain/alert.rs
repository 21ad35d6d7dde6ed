use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational - log only
    Info,
    /// Low - log only
    Low,
    /// Medium - desktop + webhook
    Medium,
    /// High - desktop + webhook
    High,
    /// Critical - desktop + audio + webhook
    Critical,
}

impl Severity {
    /// Get emoji prefix for severity
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "\u{2139}\u{fe0f}",    // info icon
            Severity::Low => "\u{1f4dd}",            // memo
            Severity::Medium => "\u{26a0}\u{fe0f}",  // warning icon
            Severity::High => "\u{274c}",            // red X
            Severity::Critical => "\u{1f6a8}",       // police light
        }
    }

    /// Notification channels for this severity; the alert log is implicit
    pub fn channels(&self) -> &'static [Channel] {
        match self {
            Severity::Critical => &[Channel::Desktop, Channel::Audio, Channel::Webhook],
            Severity::High | Severity::Medium => &[Channel::Desktop, Channel::Webhook],
            Severity::Low | Severity::Info => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Non-log notification channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Desktop,
    Audio,
    Webhook,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Desktop => "desktop",
            Channel::Audio => "audio",
            Channel::Webhook => "webhook",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single anomaly report, consumed once by the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<FixedOffset>,
}

impl Alert {
    pub fn new(severity: Severity, message: impl Into<String>, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            severity,
            message: message.into(),
            timestamp,
        }
    }

    /// Line written to the append-only alert log
    pub fn log_line(&self) -> String {
        format!(
            "{} [{}] {}",
            self.timestamp.to_rfc3339(),
            self.severity,
            self.message.replace('\n', " | ")
        )
    }

    /// Short title used by desktop notifications
    pub fn title(&self, system: &str) -> String {
        format!("{} {} {}", self.severity.emoji(), system, self.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_channel_routing() {
        assert_eq!(Severity::Critical.channels().len(), 3);
        assert!(!Severity::High.channels().contains(&Channel::Audio));
        assert_eq!(Severity::Medium.channels(), &[Channel::Desktop, Channel::Webhook]);
        assert!(Severity::Low.channels().is_empty());
        assert!(Severity::Info.channels().is_empty());
    }

    #[test]
    fn test_log_line_format() {
        let ist = FixedOffset::east_opt(330 * 60).unwrap();
        let ts = ist.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        let alert = Alert::new(Severity::High, "Worker restart failed\nexit 1", ts);

        let line = alert.log_line();
        assert_eq!(
            line,
            "2026-10-19T10:00:00+05:30 [HIGH] Worker restart failed | exit 1"
        );
    }
}
