//! Zerodha Kite Connect session probe
//!
//! Kite access tokens come from an interactive browser login, so an expired
//! token can only be replaced by an operator.

use crate::broker::{BrokerSession, ProbeFailure, Remediation};
use crate::config::BrokerConfig;
use crate::domain::BrokerKind;
use crate::error::{Result, VigilError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

const KITE_VERSION: &str = "3";

#[derive(Debug, Deserialize)]
struct KiteErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_type: Option<String>,
}

#[derive(Clone)]
pub struct KiteSession {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    token_file: PathBuf,
}

impl std::fmt::Debug for KiteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KiteSession")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("token_file", &self.token_file)
            .finish()
    }
}

impl KiteSession {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        token_file: PathBuf,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("vigil/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| VigilError::Internal(format!("failed to build Kite HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            token_file,
        })
    }

    pub fn from_env(config: &BrokerConfig) -> Result<Self> {
        let api_key = std::env::var("ZERODHA_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        Self::new(
            &config.kite_api_url,
            api_key,
            config.token_file.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Token file first, then `ZERODHA_ACCESS_TOKEN`
    fn read_token(&self) -> Option<Zeroizing<String>> {
        if let Ok(content) = std::fs::read_to_string(&self.token_file) {
            let content = Zeroizing::new(content);
            let token = content.trim();
            if !token.is_empty() {
                return Some(Zeroizing::new(token.to_string()));
            }
        }

        std::env::var("ZERODHA_ACCESS_TOKEN")
            .ok()
            .map(|t| Zeroizing::new(t.trim().to_string()))
            .filter(|t| !t.is_empty())
    }

    /// Cheapest authenticated call: equity margins
    async fn probe(&self) -> std::result::Result<(), ProbeFailure> {
        let token = self.read_token().ok_or(ProbeFailure::NoToken)?;
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProbeFailure::MissingCredentials("ZERODHA_API_KEY".to_string())
        })?;

        let authorization = Zeroizing::new(format!("token {}:{}", api_key, token.as_str()));
        let resp = self
            .http
            .get(format!("{}/user/margins/equity", self.base_url))
            .header("X-Kite-Version", KITE_VERSION)
            .header("Authorization", authorization.as_str())
            .send()
            .await
            .map_err(|e| ProbeFailure::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            debug!("Kite session valid");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<KiteErrorBody>(&body)
            .map(|b| {
                if let Some(kind) = b.error_type {
                    debug!("Kite error type: {}", kind);
                }
                b.message
            })
            .unwrap_or_default();

        match status {
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                warn!("Kite rejected the access token: {}", message);
                Err(ProbeFailure::Rejected(if message.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    message
                }))
            }
            _ => Err(ProbeFailure::Transport(format!("HTTP {}: {}", status, message))),
        }
    }
}

#[async_trait]
impl BrokerSession for KiteSession {
    fn kind(&self) -> BrokerKind {
        BrokerKind::Zerodha
    }

    fn remediation(&self) -> Remediation {
        Remediation::Operator
    }

    fn remediation_steps(&self) -> Vec<String> {
        vec![
            "Log in to Kite Connect in a browser and complete the login flow for the configured API key.".to_string(),
            format!(
                "Write the new access token to {} (or export ZERODHA_ACCESS_TOKEN).",
                self.token_file.display()
            ),
            "Run `vigil broker check` to confirm; the supervisor picks the token up on its next tick.".to_string(),
        ]
    }

    async fn validate_session(&self) -> std::result::Result<(), ProbeFailure> {
        self.probe().await
    }

    /// Kite cannot log in unattended; re-read the token in case an operator
    /// replaced it and validate that.
    async fn create_session(&self) -> std::result::Result<(), ProbeFailure> {
        self.probe().await
    }
}
