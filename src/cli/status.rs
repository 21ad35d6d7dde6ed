//! `vigil status`: the status store plus the tail of the alert log

use super::output::{print_items, print_warn, OutputMode};
use crate::persistence::StatusRecord;
use anyhow::Context;
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tabled::Tabled;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct StatusRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

fn row(field: &str, value: impl ToString) -> StatusRow {
    StatusRow {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn opt<T: ToString>(value: Option<T>, unit: &str) -> String {
    value
        .map(|v| format!("{}{}", v.to_string(), unit))
        .unwrap_or_else(|| "-".to_string())
}

/// Flatten a status record into display rows
pub fn status_rows(record: &StatusRecord) -> Vec<StatusRow> {
    let mut rows = Vec::new();

    match record.health {
        Some(ref h) => {
            rows.push(row("market", format!("{:?}", h.market_status).to_uppercase()));
            rows.push(row("bot", h.bot_status));
            rows.push(row("broker", h.broker_status));
            rows.push(row("disk", opt(h.disk_usage_pct, "%")));
            rows.push(row("memory", opt(h.memory_usage_pct, "%")));
            rows.push(row("log size", opt(h.log_size_mb, " MB")));
            rows.push(row("issues", h.issues_count));
            rows.push(row("last check", h.last_check.to_rfc3339()));
        }
        None => rows.push(row("health", "no supervisor tick recorded")),
    }

    if let Some(ref b) = record.broker {
        rows.push(row("broker kind", b.kind));
        if let Some(ref detail) = b.detail {
            rows.push(row("broker detail", detail));
        }
    }

    if let Some(ref v) = record.validation {
        rows.push(row("trading day", v.trading_day));
        rows.push(row("trading ready", v.trading_ready));
        rows.push(row(
            "confidence",
            format!("{:.2} ({})", v.confidence_score, v.band),
        ));
        rows.push(row("decision source", format!("{:?}", v.source).to_lowercase()));
        for line in &v.rationale {
            rows.push(row("rationale", line));
        }
        if let Some(ref action) = v.launch_action {
            rows.push(row("launch", action));
        }
    }

    rows
}

/// Last `n` lines of the alert log; a missing log has none
pub fn tail_lines(path: &Path, n: usize) -> anyhow::Result<Vec<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to open {}", path.display())),
    };

    let mut tail = VecDeque::with_capacity(n);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if tail.len() == n {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Ok(tail.into_iter().collect())
}

pub fn render(
    record: &StatusRecord,
    alert_log: &Path,
    alert_lines: usize,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let alerts = tail_lines(alert_log, alert_lines)?;

    if mode == OutputMode::Json {
        #[derive(Serialize)]
        struct StatusView<'a> {
            status: &'a StatusRecord,
            recent_alerts: &'a [String],
        }
        let view = StatusView {
            status: record,
            recent_alerts: &alerts,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    print_items(&status_rows(record), mode)?;
    println!();
    if alerts.is_empty() {
        print_warn("No alerts logged");
    } else {
        println!("Recent alerts:");
        for line in alerts {
            println!("  {line}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BrokerConnectionState, HealthSnapshot};
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_tail_keeps_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.log");
        let content: String = (1..=8).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, content).unwrap();

        let tail = tail_lines(&path, 5).unwrap();
        assert_eq!(tail.first().map(String::as_str), Some("line 4"));
        assert_eq!(tail.len(), 5);

        assert!(tail_lines(&dir.path().join("missing.log"), 5).unwrap().is_empty());
    }

    #[test]
    fn test_standby_rows_show_missing_resources() {
        let at = FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 19, 20, 0, 0)
            .unwrap();
        let record = StatusRecord {
            health: Some(HealthSnapshot::standby(
                false,
                BrokerConnectionState::Connected,
                at,
            )),
            ..StatusRecord::default()
        };

        let rows = status_rows(&record);
        assert!(rows.contains(&row("market", "STANDBY")));
        assert!(rows.contains(&row("disk", "-")));
        assert!(rows.contains(&row("broker", "CONNECTED")));
    }
}
