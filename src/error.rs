use thiserror::Error;

/// Main error type for the supervisor and scheduler
#[derive(Error, Debug)]
pub enum VigilError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // Broker errors
    #[error("Broker credentials missing: {0}")]
    MissingCredentials(String),

    #[error("Broker session rejected: {0}")]
    BrokerRejected(String),

    // Process control errors
    #[error("Process error: {0}")]
    Process(String),

    #[error("Another instance is already running (PID: {pid})")]
    AlreadyRunning { pid: u32 },

    // Status store errors
    #[error("Status store write failed at {path}: {source}")]
    StatusStore {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Scheduler errors
    #[error("Optimization failed: {0}")]
    Optimization(String),

    #[error("No usable parameter artifact: {0}")]
    ArtifactUnavailable(String),

    #[error("Intelligence report unavailable: {0}")]
    IntelligenceUnavailable(String),

    #[error("Job not allowed in current day phase: {0}")]
    WrongPhase(String),

    #[error("Timed out after {secs}s: {what}")]
    Timeout { what: String, secs: u64 },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl VigilError {
    /// Process exit code used by the binary
    pub fn exit_code(&self) -> i32 {
        match self {
            VigilError::AlreadyRunning { .. } => 3,
            VigilError::Config(_) | VigilError::InvalidConfig(_) => 2,
            VigilError::WrongPhase(_) => 4,
            _ => 1,
        }
    }

    /// Whether the error came from a bounded wait expiring
    pub fn is_timeout(&self) -> bool {
        matches!(self, VigilError::Timeout { .. })
    }
}

/// Result type alias for VigilError
pub type Result<T> = std::result::Result<T, VigilError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_running_has_distinct_exit_code() {
        let err = VigilError::AlreadyRunning { pid: 42 };
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("42"));

        let other = VigilError::Process("spawn failed".into());
        assert_ne!(other.exit_code(), err.exit_code());
    }

    #[test]
    fn test_timeout_detection() {
        let err = VigilError::Timeout {
            what: "intelligence fetch".into(),
            secs: 30,
        };
        assert!(err.is_timeout());
        assert!(!VigilError::Internal("x".into()).is_timeout());
    }
}
