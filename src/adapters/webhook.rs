//! Webhook alert channel
//!
//! Posts alerts as JSON to a configured endpoint.

use super::Notifier;
use crate::domain::{Alert, Channel};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Webhook notification client
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
    system: String,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    severity: &'a str,
    message: &'a str,
    timestamp: String,
    system: &'a str,
}

impl WebhookNotifier {
    /// Create a new webhook notifier from environment variable
    pub fn from_env(system: &str, timeout: Duration) -> Option<Arc<Self>> {
        std::env::var("VIGIL_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .map(|url| {
                info!("Webhook notifications enabled");
                Self::new(url, system, timeout)
            })
    }

    /// Create a new webhook notifier with explicit URL
    pub fn new(webhook_url: String, system: &str, timeout: Duration) -> Arc<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Arc::new(Self {
            client,
            webhook_url,
            system: system.to_string(),
        })
    }

    /// Send one alert
    pub async fn send_alert(&self, alert: &Alert) -> Result<(), String> {
        let payload = WebhookPayload {
            severity: alert.severity.as_str(),
            message: &alert.message,
            timestamp: alert.timestamp.to_rfc3339(),
            system: &self.system,
        };

        match self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) => {
                if resp.status().is_success() {
                    debug!("Webhook notification sent successfully");
                    Ok(())
                } else {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    error!("Webhook notification failed: {} - {}", status, body);
                    Err(format!("HTTP {}: {}", status, body))
                }
            }
            Err(e) => {
                error!("Webhook request failed: {}", e);
                Err(e.to_string())
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> Channel {
        Channel::Webhook
    }

    async fn notify(&self, alert: &Alert) -> Result<(), String> {
        self.send_alert(alert).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_payload_shape() {
        let ts = FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 19, 11, 0, 0)
            .unwrap();
        let alert = Alert::new(Severity::Critical, "Manual intervention required", ts);
        let payload = WebhookPayload {
            severity: alert.severity.as_str(),
            message: &alert.message,
            timestamp: alert.timestamp.to_rfc3339(),
            system: "PaperTradingBot",
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["severity"], "CRITICAL");
        assert_eq!(json["timestamp"], "2026-10-19T11:00:00+05:30");
        assert_eq!(json["system"], "PaperTradingBot");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_returns_error() {
        let notifier = WebhookNotifier::new(
            "http://127.0.0.1:9/hook".to_string(),
            "test",
            Duration::from_secs(2),
        );
        let alert = Alert::new(
            Severity::High,
            "probe",
            chrono::Utc::now().fixed_offset(),
        );
        assert!(notifier.notify(&alert).await.is_err());
    }
}
