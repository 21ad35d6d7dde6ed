//! Broker connectivity
//!
//! Each broker kind implements [`BrokerSession`]; the [`BrokerMonitor`] state
//! machine drives probes and reconnects without knowing which kind it holds.

pub mod monitor;

pub use monitor::{BrokerCheck, BrokerMonitor};

use crate::adapters::{KiteSession, SmartApiSession};
use crate::config::AppConfig;
use crate::domain::BrokerKind;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Why a probe or session attempt did not produce a usable session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("no access token stored")]
    NoToken,

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// The broker answered and refused; message is the provider's, verbatim
    #[error("{0}")]
    Rejected(String),

    /// Network failure or unexpected response
    #[error("transport error: {0}")]
    Transport(String),
}

/// How a broker recovers from a rejected session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Credentials on hand are enough to log in again
    Automatic,
    /// A human has to complete an interactive login
    Operator,
}

#[async_trait]
pub trait BrokerSession: Send + Sync {
    fn kind(&self) -> BrokerKind;

    fn remediation(&self) -> Remediation;

    /// Operator steps written to the manual-intervention notice
    fn remediation_steps(&self) -> Vec<String>;

    /// Check that a usable session exists, establishing one when the broker
    /// allows it without operator input
    async fn validate_session(&self) -> std::result::Result<(), ProbeFailure>;

    /// Establish a fresh session from stored credentials
    async fn create_session(&self) -> std::result::Result<(), ProbeFailure>;
}

/// Build the session for the configured broker kind
pub fn session_for(config: &AppConfig) -> Result<Arc<dyn BrokerSession>> {
    let session: Arc<dyn BrokerSession> = match config.broker.kind {
        BrokerKind::Zerodha => Arc::new(KiteSession::from_env(&config.broker)?),
        BrokerKind::AngelOne => {
            Arc::new(SmartApiSession::from_env(&config.broker, &config.paths.state_dir)?)
        }
    };
    Ok(session)
}
