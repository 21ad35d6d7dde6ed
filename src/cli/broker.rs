//! Broker commands
//!
//! vigil broker check             - Probe the broker once and persist the state
//! vigil broker select <kind>     - Persist the broker kind for later runs

use super::output::{print_success, print_warn};
use super::runtime::Runtime;
use crate::config::BROKER_SELECTION_FILE;
use crate::domain::{BrokerConnectionState, BrokerKind};
use crate::error::Result;
use crate::persistence::atomic::write_bytes_atomic;
use clap::Subcommand;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum BrokerCommands {
    /// Probe the configured broker and record the result
    Check,

    /// Choose the broker used by every vigil process
    Select {
        /// zerodha or angelone
        kind: BrokerKind,
    },
}

impl BrokerCommands {
    pub async fn run(self, config_dir: &Path) -> Result<()> {
        match self {
            BrokerCommands::Check => {
                let runtime = Runtime::load(config_dir)?;
                let monitor = runtime.broker_monitor()?;
                let state = monitor.check().await?;
                let detail = runtime.store.load().broker.and_then(|b| b.detail);

                match state {
                    s if s.is_connected() => {
                        print_success(&format!("{} broker: {}", runtime.config.broker.kind, s))
                    }
                    BrokerConnectionState::ManualInterventionRequired => print_warn(&format!(
                        "{} broker: {} (see {})",
                        runtime.config.broker.kind,
                        state,
                        monitor.notice_path().display()
                    )),
                    s => print_warn(&format!(
                        "{} broker: {}{}",
                        runtime.config.broker.kind,
                        s,
                        detail.map(|d| format!(" ({d})")).unwrap_or_default()
                    )),
                }
                Ok(())
            }
            BrokerCommands::Select { kind } => {
                let path = write_selection(config_dir, kind)?;
                print_success(&format!("Broker set to {} in {}", kind, path.display()));
                Ok(())
            }
        }
    }
}

#[derive(Serialize)]
struct BrokerSelection {
    broker: SelectedKind,
}

#[derive(Serialize)]
struct SelectedKind {
    kind: BrokerKind,
}

/// Write `broker.toml`, which overrides the kind from every other file
pub fn write_selection(config_dir: &Path, kind: BrokerKind) -> Result<PathBuf> {
    let path = config_dir.join(BROKER_SELECTION_FILE);
    let body = toml::to_string(&BrokerSelection {
        broker: SelectedKind { kind },
    })?;
    write_bytes_atomic(&path, body.as_bytes())?;
    info!("Broker selection written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_selection_is_picked_up_by_config() {
        let dir = tempfile::tempdir().unwrap();
        write_selection(dir.path(), BrokerKind::AngelOne).unwrap();

        let content = std::fs::read_to_string(dir.path().join(BROKER_SELECTION_FILE)).unwrap();
        assert!(content.contains("kind = \"angelone\""));

        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.broker.kind, BrokerKind::AngelOne);
    }
}
