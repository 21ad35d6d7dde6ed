//! Angel One SmartAPI session
//!
//! Sessions are created unattended from the client code, password and a
//! TOTP secret. The refresh token from the last login is kept on disk and
//! tried before a full login.

use super::totp;
use crate::broker::{BrokerSession, ProbeFailure, Remediation};
use crate::config::BrokerConfig;
use crate::domain::BrokerKind;
use crate::error::{Result, VigilError};
use crate::persistence::write_private;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const LOGIN_PATH: &str = "/rest/auth/angelbroking/user/v1/loginByPassword";
const REFRESH_PATH: &str = "/rest/auth/angelbroking/jwt/v1/generateTokens";
const PROFILE_PATH: &str = "/rest/secure/angelbroking/user/v1/getProfile";

/// File under the state directory holding the last refresh token
pub const REFRESH_TOKEN_FILE: &str = "angelone_refresh_token";

/// Login credentials, wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SmartApiCredentials {
    pub api_key: String,
    pub client_code: String,
    pub password: String,
    pub totp_secret: String,
}

// Custom Debug to never leak secrets into logs or error messages.
impl std::fmt::Debug for SmartApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartApiCredentials")
            .field("api_key", &"[REDACTED]")
            .field("client_code", &self.client_code)
            .field("password", &"[REDACTED]")
            .field("totp_secret", &"[REDACTED]")
            .finish()
    }
}

impl SmartApiCredentials {
    /// Read `ANGELONE_*` variables; every missing name is reported
    pub fn from_env() -> std::result::Result<Self, ProbeFailure> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
        };

        let api_key = read("ANGELONE_API_KEY");
        let client_code = read("ANGELONE_CLIENT_CODE");
        let password = read("ANGELONE_PASSWORD");
        let totp_secret = read("ANGELONE_TOTP_SECRET");

        match (api_key, client_code, password, totp_secret) {
            (Some(api_key), Some(client_code), Some(password), Some(totp_secret)) => Ok(Self {
                api_key,
                client_code,
                password,
                totp_secret,
            }),
            (api_key, client_code, password, totp_secret) => {
                let missing: Vec<&str> = [
                    ("ANGELONE_API_KEY", api_key.is_none()),
                    ("ANGELONE_CLIENT_CODE", client_code.is_none()),
                    ("ANGELONE_PASSWORD", password.is_none()),
                    ("ANGELONE_TOTP_SECRET", totp_secret.is_none()),
                ]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| *name)
                .collect();
                Err(ProbeFailure::MissingCredentials(missing.join(", ")))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SmartResponse {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    errorcode: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    jwt_token: String,
    refresh_token: String,
}

struct ActiveSession {
    jwt: Zeroizing<String>,
    refresh: Zeroizing<String>,
}

pub struct SmartApiSession {
    http: Client,
    base_url: String,
    credentials: std::result::Result<SmartApiCredentials, ProbeFailure>,
    refresh_file: PathBuf,
    active: Mutex<Option<ActiveSession>>,
}

impl std::fmt::Debug for SmartApiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartApiSession")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .field("refresh_file", &self.refresh_file)
            .finish()
    }
}

impl SmartApiSession {
    pub fn new(
        base_url: &str,
        credentials: std::result::Result<SmartApiCredentials, ProbeFailure>,
        state_dir: &Path,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("vigil/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| {
                VigilError::Internal(format!("failed to build SmartAPI HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            refresh_file: state_dir.join(REFRESH_TOKEN_FILE),
            active: Mutex::new(None),
        })
    }

    /// Missing credentials are not an error here; they surface as a
    /// failed probe so the state machine can record them.
    pub fn from_env(config: &BrokerConfig, state_dir: &Path) -> Result<Self> {
        Self::new(
            &config.smartapi_url,
            SmartApiCredentials::from_env(),
            state_dir,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn credentials(&self) -> std::result::Result<&SmartApiCredentials, ProbeFailure> {
        self.credentials.as_ref().map_err(Clone::clone)
    }

    fn with_headers(&self, req: RequestBuilder, api_key: &str) -> RequestBuilder {
        req.header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("X-UserType", "USER")
            .header("X-SourceID", "WEB")
            .header("X-ClientLocalIP", "127.0.0.1")
            .header("X-ClientPublicIP", "127.0.0.1")
            .header("X-MACAddress", "00:00:00:00:00:00")
            .header("X-PrivateKey", api_key)
    }

    /// Send and unwrap the SmartAPI envelope
    async fn call(&self, req: RequestBuilder) -> std::result::Result<SmartResponse, ProbeFailure> {
        let resp = req
            .send()
            .await
            .map_err(|e| ProbeFailure::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProbeFailure::Transport(e.to_string()))?;

        let parsed: SmartResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(ProbeFailure::Transport(format!("HTTP {}", status)))
            }
            Err(e) => return Err(ProbeFailure::Transport(format!("unreadable response: {}", e))),
        };

        if parsed.status {
            Ok(parsed)
        } else {
            if let Some(ref code) = parsed.errorcode {
                debug!("SmartAPI error code: {}", code);
            }
            Err(ProbeFailure::Rejected(parsed.message))
        }
    }

    fn token_data(resp: SmartResponse) -> std::result::Result<ActiveSession, ProbeFailure> {
        let data = resp
            .data
            .ok_or_else(|| ProbeFailure::Transport("login response without data".to_string()))?;
        let tokens: TokenData = serde_json::from_value(data)
            .map_err(|e| ProbeFailure::Transport(format!("login response: {}", e)))?;

        let jwt = tokens
            .jwt_token
            .strip_prefix("Bearer ")
            .unwrap_or(&tokens.jwt_token)
            .to_string();
        Ok(ActiveSession {
            jwt: Zeroizing::new(jwt),
            refresh: Zeroizing::new(tokens.refresh_token),
        })
    }

    async fn profile(&self, creds: &SmartApiCredentials, jwt: &str) -> std::result::Result<(), ProbeFailure> {
        let req = self
            .http
            .get(format!("{}{}", self.base_url, PROFILE_PATH))
            .bearer_auth(jwt);
        self.call(self.with_headers(req, &creds.api_key)).await?;
        Ok(())
    }

    async fn refresh(
        &self,
        creds: &SmartApiCredentials,
        refresh: &str,
        jwt: Option<&str>,
    ) -> std::result::Result<ActiveSession, ProbeFailure> {
        let mut req = self
            .http
            .post(format!("{}{}", self.base_url, REFRESH_PATH))
            .json(&json!({ "refreshToken": refresh }));
        if let Some(jwt) = jwt {
            req = req.bearer_auth(jwt);
        }
        let resp = self.call(self.with_headers(req, &creds.api_key)).await?;
        Self::token_data(resp)
    }

    async fn login(&self, creds: &SmartApiCredentials) -> std::result::Result<ActiveSession, ProbeFailure> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let code = totp::code_at(&creds.totp_secret, now)
            .map_err(|e| ProbeFailure::MissingCredentials(e.to_string()))?;

        let body = Zeroizing::new(
            json!({
                "clientcode": creds.client_code,
                "password": creds.password,
                "totp": code,
            })
            .to_string(),
        );
        let req = self
            .http
            .post(format!("{}{}", self.base_url, LOGIN_PATH))
            .body(body.as_bytes().to_vec());
        let resp = self.call(self.with_headers(req, &creds.api_key)).await?;
        let session = Self::token_data(resp)?;

        // Login alone does not prove the token is usable
        self.profile(creds, &session.jwt).await?;
        info!("SmartAPI session created for {}", creds.client_code);
        Ok(session)
    }

    fn stored_refresh_token(&self) -> Option<Zeroizing<String>> {
        std::fs::read_to_string(&self.refresh_file)
            .ok()
            .map(|t| Zeroizing::new(t.trim().to_string()))
            .filter(|t| !t.is_empty())
            .or_else(|| {
                std::env::var("ANGELONE_REFRESH_TOKEN")
                    .ok()
                    .map(Zeroizing::new)
                    .filter(|t| !t.trim().is_empty())
            })
    }

    fn persist_refresh_token(&self, refresh: &str) {
        if let Err(e) = write_private(&self.refresh_file, refresh) {
            warn!(
                "Could not save SmartAPI refresh token to {}: {}",
                self.refresh_file.display(),
                e
            );
        } else {
            debug!("Saved SmartAPI refresh token to {}", self.refresh_file.display());
        }
    }

    async fn activate(&self, session: ActiveSession) {
        self.persist_refresh_token(&session.refresh);
        *self.active.lock().await = Some(session);
    }
}

#[async_trait]
impl BrokerSession for SmartApiSession {
    fn kind(&self) -> BrokerKind {
        BrokerKind::AngelOne
    }

    fn remediation(&self) -> Remediation {
        Remediation::Automatic
    }

    fn remediation_steps(&self) -> Vec<String> {
        vec![
            "Check ANGELONE_API_KEY, ANGELONE_CLIENT_CODE, ANGELONE_PASSWORD and ANGELONE_TOTP_SECRET.".to_string(),
            format!("Delete {} if the stored refresh token is stale.", self.refresh_file.display()),
            "Run `vigil broker check` to confirm.".to_string(),
        ]
    }

    /// Cached session, then refresh token, then full TOTP login
    async fn validate_session(&self) -> std::result::Result<(), ProbeFailure> {
        let creds = self.credentials()?;

        let (cached_jwt, cached_refresh) = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(s) => (
                    Some(Zeroizing::new(s.jwt.to_string())),
                    Some(Zeroizing::new(s.refresh.to_string())),
                ),
                None => (None, None),
            }
        };

        if let Some(ref jwt) = cached_jwt {
            match self.profile(creds, jwt).await {
                Ok(()) => return Ok(()),
                Err(ProbeFailure::Transport(e)) => return Err(ProbeFailure::Transport(e)),
                Err(e) => debug!("Cached SmartAPI session rejected: {}", e),
            }
        }

        if let Some(refresh) = cached_refresh.or_else(|| self.stored_refresh_token()) {
            match self.refresh(creds, &refresh, cached_jwt.as_deref().map(|s| s.as_str())).await {
                Ok(session) => {
                    info!("SmartAPI session renewed via refresh token");
                    self.activate(session).await;
                    return Ok(());
                }
                Err(e) => warn!("SmartAPI refresh token failed: {}. Trying TOTP...", e),
            }
        }

        let session = self.login(creds).await?;
        self.activate(session).await;
        Ok(())
    }

    async fn create_session(&self) -> std::result::Result<(), ProbeFailure> {
        let creds = self.credentials()?;
        self.active.lock().await.take();

        let session = self.login(creds).await?;
        self.activate(session).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> SmartApiCredentials {
        SmartApiCredentials {
            api_key: "key-123".to_string(),
            client_code: "A123456".to_string(),
            password: "hunter2".to_string(),
            totp_secret: "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ".to_string(),
        }
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let debug = format!("{:?}", creds());
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("key-123"));
        assert!(debug.contains("A123456"));
    }

    #[test]
    fn test_token_data_strips_bearer_prefix() {
        let resp = SmartResponse {
            status: true,
            message: "SUCCESS".to_string(),
            errorcode: None,
            data: Some(json!({
                "jwtToken": "Bearer eyJhbGci",
                "refreshToken": "eyJyZWZyZXNo",
                "feedToken": "feed"
            })),
        };
        let session = SmartApiSession::token_data(resp).ok().unwrap();
        assert_eq!(session.jwt.as_str(), "eyJhbGci");
        assert_eq!(session.refresh.as_str(), "eyJyZWZyZXNo");
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let session = SmartApiSession::new(
            "http://127.0.0.1:9",
            Err(ProbeFailure::MissingCredentials("ANGELONE_PASSWORD".to_string())),
            dir.path(),
            Duration::from_secs(1),
        )
        .unwrap();

        let err = session.validate_session().await.unwrap_err();
        assert_eq!(
            err,
            ProbeFailure::MissingCredentials("ANGELONE_PASSWORD".to_string())
        );
        assert_eq!(session.remediation(), Remediation::Automatic);
    }

    #[tokio::test]
    async fn test_unreachable_api_is_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let session =
            SmartApiSession::new("http://127.0.0.1:9", Ok(creds()), dir.path(), Duration::from_secs(1))
                .unwrap();

        let err = session.create_session().await.unwrap_err();
        assert!(matches!(err, ProbeFailure::Transport(_)));
        assert!(!dir.path().join(REFRESH_TOKEN_FILE).exists());
    }
}
