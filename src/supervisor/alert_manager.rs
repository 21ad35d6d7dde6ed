//! Alert Dispatcher
//!
//! Every alert is appended to the alert log. Notification channels are then
//! chosen by severity and gated by an hourly rate bucket. Channel calls run
//! on background tasks so a slow endpoint never stalls the caller.

use crate::adapters::Notifier;
use crate::clock::{hour_key, Clock};
use crate::domain::{Alert, Channel, Severity};
use crate::persistence::{read_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for the alert dispatcher
#[derive(Debug, Clone)]
pub struct AlertDispatcherConfig {
    /// Notifications allowed per hour key (default: 10)
    pub ceiling_per_hour: u32,
    /// Append-only alert log
    pub log_path: PathBuf,
    /// Where the rate bucket is shared with other processes (none: memory only)
    pub bucket_path: Option<PathBuf>,
    /// Upper bound for one channel call (default: 10s)
    pub channel_timeout: Duration,
}

impl AlertDispatcherConfig {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            ceiling_per_hour: 10,
            log_path: log_path.into(),
            bucket_path: None,
            channel_timeout: Duration::from_secs(10),
        }
    }
}

/// Hourly notification counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRateBucket {
    pub hour_key: u64,
    pub count: u32,
    /// Calls in this hour whose notifications were dropped
    #[serde(default)]
    pub suppressed: u32,
}

impl AlertRateBucket {
    /// Count one dispatch; `true` if its notifications may go out
    pub fn admit(&mut self, hour_key: u64, ceiling: u32) -> bool {
        if self.hour_key != hour_key {
            *self = AlertRateBucket {
                hour_key,
                count: 1,
                suppressed: 0,
            };
            return true;
        }

        self.count = self.count.saturating_add(1);
        if self.count > ceiling {
            self.suppressed = self.suppressed.saturating_add(1);
            false
        } else {
            true
        }
    }
}

/// What one `dispatch` call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub logged: bool,
    pub suppressed: bool,
    /// Channels a notification task was started for
    pub channels: Vec<Channel>,
}

pub struct AlertDispatcher {
    config: AlertDispatcherConfig,
    clock: Arc<dyn Clock>,
    notifiers: Vec<Arc<dyn Notifier>>,
    bucket: Mutex<AlertRateBucket>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl AlertDispatcher {
    pub fn new(
        config: AlertDispatcherConfig,
        clock: Arc<dyn Clock>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        let bucket = config
            .bucket_path
            .as_deref()
            .map(load_bucket)
            .unwrap_or_default();

        Self {
            config,
            clock,
            notifiers,
            bucket: Mutex::new(bucket),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.config.log_path
    }

    /// Log, rate-limit and fan out one alert. Never fails.
    pub async fn dispatch(&self, severity: Severity, message: impl Into<String>) -> DispatchOutcome {
        self.dispatch_alert(Alert::new(severity, message, self.clock.now()))
            .await
    }

    pub async fn dispatch_alert(&self, alert: Alert) -> DispatchOutcome {
        match alert.severity {
            Severity::Info | Severity::Low => info!("[{}] {}", alert.severity, alert.message),
            Severity::Medium => warn!("[{}] {}", alert.severity, alert.message),
            Severity::High | Severity::Critical => {
                error!("[{}] {}", alert.severity, alert.message)
            }
        }

        let logged = match self.append_log(&alert) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to append to alert log {}: {}",
                    self.config.log_path.display(),
                    e
                );
                false
            }
        };

        if !self.admit(&alert).await {
            debug!("Alert notifications suppressed by hourly ceiling");
            return DispatchOutcome {
                logged,
                suppressed: true,
                channels: Vec::new(),
            };
        }

        let routes = alert.severity.channels();
        let alert = Arc::new(alert);
        let mut channels = Vec::new();
        let mut pending = self.pending.lock().await;
        pending.retain(|handle| !handle.is_finished());

        for notifier in &self.notifiers {
            let channel = notifier.channel();
            if !routes.contains(&channel) {
                continue;
            }

            let notifier = notifier.clone();
            let alert = alert.clone();
            let timeout = self.config.channel_timeout;
            pending.push(tokio::spawn(async move {
                match tokio::time::timeout(timeout, notifier.notify(&alert)).await {
                    Ok(Ok(())) => debug!("Alert delivered via {}", channel),
                    Ok(Err(e)) => warn!("Alert channel {} failed: {}", channel, e),
                    Err(_) => warn!("Alert channel {} timed out after {:?}", channel, timeout),
                }
            }));
            channels.push(channel);
        }

        DispatchOutcome {
            logged,
            suppressed: false,
            channels,
        }
    }

    /// Wait for in-flight channel calls
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = self.pending.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Alert channel task aborted: {}", e);
            }
        }
    }

    pub async fn bucket(&self) -> AlertRateBucket {
        self.bucket.lock().await.clone()
    }

    /// Suppressed calls in the current hour
    pub async fn suppressed_count(&self) -> u32 {
        self.bucket.lock().await.suppressed
    }

    fn append_log(&self, alert: &Alert) -> std::io::Result<()> {
        if let Some(parent) = self
            .config
            .log_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.log_path)?;
        writeln!(file, "{}", alert.log_line())
    }

    /// Serialized through the bucket lock; the shared file is re-read so
    /// the scheduled jobs and the supervisor draw from one budget.
    async fn admit(&self, alert: &Alert) -> bool {
        let mut bucket = self.bucket.lock().await;
        if let Some(ref path) = self.config.bucket_path {
            let shared = load_bucket(path);
            if shared.hour_key >= bucket.hour_key {
                *bucket = shared;
            }
        }

        let admitted = bucket.admit(hour_key(alert.timestamp), self.config.ceiling_per_hour);

        if let Some(ref path) = self.config.bucket_path {
            if let Err(e) = write_json_atomic(path, &*bucket) {
                warn!("Failed to persist alert rate bucket: {}", e);
            }
        }
        admitted
    }
}

fn load_bucket(path: &Path) -> AlertRateBucket {
    match read_json::<AlertRateBucket>(path) {
        Ok(bucket) => bucket.unwrap_or_default(),
        Err(e) => {
            warn!("Ignoring unreadable alert rate bucket {}: {}", path.display(), e);
            AlertRateBucket::default()
        }
    }
}
