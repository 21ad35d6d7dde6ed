//! Status Store
//!
//! One JSON document at a well-known path, replaced atomically on every
//! write. Each writer owns one section (health, broker, validation) and
//! rewrites the document with the other sections as last persisted.

use super::atomic::{read_json, write_json_atomic};
use crate::domain::{BrokerConnectionState, BrokerStatus, HealthSnapshot, ValidationSummary};
use crate::error::{Result, VigilError};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Latest supervisor tick
    #[serde(default)]
    pub health: Option<HealthSnapshot>,
    /// Latest broker probe, stable key for readers that must not re-probe
    #[serde(default)]
    pub broker: Option<BrokerStatus>,
    /// Latest morning decision
    #[serde(default)]
    pub validation: Option<ValidationSummary>,
    #[serde(default)]
    pub updated_at: Option<DateTime<FixedOffset>>,
}

impl StatusRecord {
    pub fn broker_state(&self) -> BrokerConnectionState {
        self.broker
            .as_ref()
            .map(|b| b.state)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current record
    ///
    /// A missing file yields an empty record. A corrupt file is logged and
    /// treated as empty so the next write repairs it.
    pub fn load(&self) -> StatusRecord {
        match read_json::<StatusRecord>(&self.path) {
            Ok(Some(record)) => record,
            Ok(None) => StatusRecord::default(),
            Err(e) => {
                warn!("Status store at {} unreadable, starting empty: {}", self.path.display(), e);
                StatusRecord::default()
            }
        }
    }

    pub fn write_health(&self, health: &HealthSnapshot) -> Result<()> {
        let at = health.last_check;
        self.update(at, |record| record.health = Some(health.clone()))
    }

    pub fn write_broker(&self, broker: &BrokerStatus) -> Result<()> {
        let at = broker.updated_at;
        self.update(at, |record| record.broker = Some(broker.clone()))
    }

    pub fn write_validation(&self, validation: &ValidationSummary) -> Result<()> {
        let at = validation.decided_at;
        self.update(at, |record| record.validation = Some(validation.clone()))
    }

    fn update(&self, at: DateTime<FixedOffset>, apply: impl FnOnce(&mut StatusRecord)) -> Result<()> {
        let mut record = self.load();
        apply(&mut record);
        record.updated_at = Some(at);

        write_json_atomic(&self.path, &record).map_err(|e| match e {
            VigilError::Io(source) => VigilError::StatusStore {
                path: self.path.display().to_string(),
                source,
            },
            other => other,
        })?;

        debug!("Status store updated at {}", self.path.display());
        Ok(())
    }
}
