//! Local alert channels: desktop notifications and an audible alarm

use super::Notifier;
use crate::domain::{Alert, Channel, Severity};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// `notify-send` popup
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    system: String,
}

impl DesktopNotifier {
    pub fn new(system: &str) -> Self {
        Self {
            system: system.to_string(),
        }
    }

    fn urgency(severity: Severity) -> &'static str {
        match severity {
            Severity::Critical | Severity::High => "critical",
            Severity::Medium => "normal",
            Severity::Low | Severity::Info => "low",
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    fn channel(&self) -> Channel {
        Channel::Desktop
    }

    async fn notify(&self, alert: &Alert) -> Result<(), String> {
        run_quiet(
            Command::new("notify-send")
                .arg("-u")
                .arg(Self::urgency(alert.severity))
                .arg("-a")
                .arg("vigil")
                .arg(alert.title(&self.system))
                .arg(&alert.message),
        )
        .await
    }
}

/// Plays a sound file through a command-line player
#[derive(Debug, Clone)]
pub struct AudioNotifier {
    player: String,
    sound: Option<PathBuf>,
}

impl AudioNotifier {
    pub fn new(player: &str, sound: Option<PathBuf>) -> Self {
        Self {
            player: player.to_string(),
            sound,
        }
    }
}

#[async_trait]
impl Notifier for AudioNotifier {
    fn channel(&self) -> Channel {
        Channel::Audio
    }

    async fn notify(&self, _alert: &Alert) -> Result<(), String> {
        let mut cmd = Command::new(&self.player);
        if let Some(ref sound) = self.sound {
            cmd.arg(sound);
        }
        run_quiet(&mut cmd).await
    }
}

async fn run_quiet(cmd: &mut Command) -> Result<(), String> {
    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| e.to_string())?;

    if status.success() {
        debug!("Local notification delivered");
        Ok(())
    } else {
        Err(format!("exited with {}", status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_mapping() {
        assert_eq!(DesktopNotifier::urgency(Severity::Critical), "critical");
        assert_eq!(DesktopNotifier::urgency(Severity::Medium), "normal");
    }

    #[tokio::test]
    async fn test_missing_player_is_an_error_not_a_panic() {
        let audio = AudioNotifier::new("/nonexistent/player", None);
        let alert = Alert::new(Severity::Critical, "x", chrono::Utc::now().fixed_offset());
        assert!(audio.notify(&alert).await.is_err());
    }
}
