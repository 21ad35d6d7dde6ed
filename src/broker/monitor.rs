//! Broker Connection State Machine
//!
//! Probes the configured broker, attempts one reconnect when the session is
//! down and persists every outcome to the status store.

use super::{BrokerSession, ProbeFailure, Remediation};
use crate::clock::Clock;
use crate::domain::{BrokerConnectionState, BrokerStatus};
use crate::error::Result;
use crate::persistence::atomic::write_bytes_atomic;
use crate::persistence::StatusStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// File in the state directory explaining how to restore the broker session
pub const MANUAL_NOTICE_FILE: &str = "MANUAL_INTERVENTION_REQUIRED.txt";

/// Result of one `check_and_reconnect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerCheck {
    /// State after the first probe
    pub initial: BrokerConnectionState,
    /// State after the reconnect attempt (same as `initial` if none was made)
    pub outcome: BrokerConnectionState,
    /// Provider diagnostic from the last failing call
    pub detail: Option<String>,
    /// This call moved the broker into manual intervention
    pub entered_manual: bool,
}

impl BrokerCheck {
    pub fn reconnect_attempted(&self) -> bool {
        !self.initial.is_connected()
    }

    pub fn is_connected(&self) -> bool {
        self.outcome.is_connected()
    }
}

pub struct BrokerMonitor {
    session: Arc<dyn BrokerSession>,
    store: StatusStore,
    clock: Arc<dyn Clock>,
    notice_path: PathBuf,
    current: Mutex<BrokerConnectionState>,
}

impl BrokerMonitor {
    /// Resume from the persisted state when it belongs to the same broker kind
    pub fn new(
        session: Arc<dyn BrokerSession>,
        store: StatusStore,
        clock: Arc<dyn Clock>,
        state_dir: &Path,
    ) -> Self {
        let persisted = store
            .load()
            .broker
            .filter(|b| b.kind == session.kind())
            .map(|b| b.state)
            .unwrap_or_default();

        Self {
            session,
            store,
            clock,
            notice_path: state_dir.join(MANUAL_NOTICE_FILE),
            current: Mutex::new(persisted),
        }
    }

    pub async fn state(&self) -> BrokerConnectionState {
        *self.current.lock().await
    }

    pub fn notice_path(&self) -> &Path {
        &self.notice_path
    }

    /// Probe once and classify
    ///
    /// No reconnect is attempted, so a rejected token on a broker that needs
    /// the operator goes straight on to manual intervention.
    pub async fn check(&self) -> Result<BrokerConnectionState> {
        let mut current = self.current.lock().await;
        let (state, detail) = self.probe(&mut current).await?;
        if state == BrokerConnectionState::TokenExpired {
            let reason = detail.unwrap_or_else(|| "token rejected".to_string());
            return self.escalate(&mut current, reason);
        }
        Ok(state)
    }

    /// Probe, and when the session is down make exactly one reconnect attempt
    pub async fn check_and_reconnect(&self) -> Result<BrokerCheck> {
        let mut current = self.current.lock().await;
        let was_manual = current.requires_operator();

        let (initial, probe_detail) = self.probe(&mut current).await?;
        if initial.is_connected() {
            return Ok(BrokerCheck {
                initial,
                outcome: initial,
                detail: None,
                entered_manual: false,
            });
        }

        let (outcome, detail) = self.reconnect(&mut current).await?;
        Ok(BrokerCheck {
            initial,
            outcome,
            detail: detail.or(probe_detail),
            entered_manual: !was_manual && outcome.requires_operator(),
        })
    }

    async fn probe(
        &self,
        current: &mut BrokerConnectionState,
    ) -> Result<(BrokerConnectionState, Option<String>)> {
        let (target, detail) = match self.session.validate_session().await {
            Ok(()) => (BrokerConnectionState::Connected, None),
            Err(ProbeFailure::NoToken) => (
                BrokerConnectionState::NoToken,
                Some(ProbeFailure::NoToken.to_string()),
            ),
            Err(failure) => (self.classify(&failure), Some(failure.to_string())),
        };

        let state = self.apply(current, target, detail.clone())?;
        Ok((state, detail))
    }

    async fn reconnect(
        &self,
        current: &mut BrokerConnectionState,
    ) -> Result<(BrokerConnectionState, Option<String>)> {
        if self.session.remediation() == Remediation::Automatic {
            self.apply(current, BrokerConnectionState::Connecting, None)?;
        }

        match self.session.create_session().await {
            Ok(()) => {
                info!("Broker {} reconnected", self.session.kind());
                let state = self.apply(current, BrokerConnectionState::Reconnected, None)?;
                Ok((state, None))
            }
            Err(ProbeFailure::NoToken) => {
                let detail = Some(ProbeFailure::NoToken.to_string());
                let state = self.apply(current, BrokerConnectionState::NoToken, detail.clone())?;
                Ok((state, detail))
            }
            Err(failure) => {
                let detail = failure.to_string();

                // An expired token cannot be fixed from here, whatever the retry saw
                if *current == BrokerConnectionState::TokenExpired {
                    let state = self.escalate(current, detail.clone())?;
                    return Ok((state, Some(detail)));
                }

                let state = self.apply(current, self.classify(&failure), Some(detail.clone()))?;
                Ok((state, Some(detail)))
            }
        }
    }

    fn classify(&self, failure: &ProbeFailure) -> BrokerConnectionState {
        match (self.session.remediation(), failure) {
            (_, ProbeFailure::NoToken) => BrokerConnectionState::NoToken,
            (Remediation::Operator, ProbeFailure::Rejected(_)) => {
                BrokerConnectionState::TokenExpired
            }
            _ => BrokerConnectionState::Failed,
        }
    }

    /// Move to `target` if allowed and persist; returns the resulting state
    fn apply(
        &self,
        current: &mut BrokerConnectionState,
        target: BrokerConnectionState,
        detail: Option<String>,
    ) -> Result<BrokerConnectionState> {
        if current.can_transition_to(target) {
            if *current != target {
                debug!("Broker state {} -> {}", current, target);
            }
            *current = target;
        } else {
            debug!("Broker state stays {} (probe saw {})", current, target);
        }

        if current.is_connected() {
            self.clear_notice();
        }

        self.store.write_broker(&BrokerStatus {
            kind: self.session.kind(),
            state: *current,
            detail,
            updated_at: self.clock.now(),
        })?;
        Ok(*current)
    }

    /// Write the notice and enter manual intervention
    fn escalate(
        &self,
        current: &mut BrokerConnectionState,
        reason: String,
    ) -> Result<BrokerConnectionState> {
        self.write_notice(&reason)?;
        self.apply(
            current,
            BrokerConnectionState::ManualInterventionRequired,
            Some(reason),
        )
    }

    fn write_notice(&self, reason: &str) -> Result<()> {
        let mut text = format!(
            "MANUAL INTERVENTION REQUIRED\n\nBroker: {}\nDetected: {}\nReason: {}\n\nSteps:\n",
            self.session.kind(),
            self.clock.now().to_rfc3339(),
            reason
        );
        for (i, step) in self.session.remediation_steps().iter().enumerate() {
            text.push_str(&format!("{}. {}\n", i + 1, step));
        }

        write_bytes_atomic(&self.notice_path, text.as_bytes())?;
        error!(
            "Broker {} needs manual intervention, see {}",
            self.session.kind(),
            self.notice_path.display()
        );
        Ok(())
    }

    fn clear_notice(&self) {
        match std::fs::remove_file(&self.notice_path) {
            Ok(()) => info!("Broker session restored, removed {}", self.notice_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", self.notice_path.display(), e),
        }
    }
}
