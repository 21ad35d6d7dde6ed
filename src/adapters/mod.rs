//! External integrations
//!
//! Alert channels (desktop, audio, webhook) and broker sessions (Kite,
//! SmartAPI).

pub mod angel_one;
pub mod desktop;
pub mod kite;
pub mod totp;
pub mod webhook;

pub use angel_one::{SmartApiCredentials, SmartApiSession};
pub use desktop::{AudioNotifier, DesktopNotifier};
pub use kite::KiteSession;
pub use webhook::WebhookNotifier;

use crate::config::AlertConfig;
use crate::domain::{Alert, Channel};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One non-log alert channel
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> Channel;

    async fn notify(&self, alert: &Alert) -> Result<(), String>;
}

/// Channels enabled by configuration
pub fn notifiers_from_config(config: &AlertConfig) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if config.desktop {
        notifiers.push(Arc::new(DesktopNotifier::new(&config.system_name)));
    }
    if config.audio {
        notifiers.push(Arc::new(AudioNotifier::new(
            &config.audio_command,
            config.audio_file.clone(),
        )));
    }

    let timeout = Duration::from_secs(config.channel_timeout_secs);
    let webhook = match config.webhook_url {
        Some(ref url) if !url.is_empty() => Some(WebhookNotifier::new(
            url.clone(),
            &config.system_name,
            timeout,
        )),
        _ => WebhookNotifier::from_env(&config.system_name, timeout),
    };
    if let Some(webhook) = webhook {
        notifiers.push(webhook);
    }

    notifiers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_follow_switches() {
        let config = AlertConfig {
            desktop: false,
            audio: true,
            webhook_url: Some("https://hooks.example.com/vigil".to_string()),
            ..AlertConfig::default()
        };

        let channels: Vec<Channel> = notifiers_from_config(&config)
            .iter()
            .map(|n| n.channel())
            .collect();
        assert_eq!(channels, vec![Channel::Audio, Channel::Webhook]);
    }
}
