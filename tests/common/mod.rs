//! In-memory collaborators shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil::adapters::Notifier;
use vigil::broker::{BrokerSession, ProbeFailure, Remediation};
use vigil::config::{MarketConfig, SupervisorConfig, ThresholdConfig};
use vigil::domain::{Alert, BrokerKind, Channel};
use vigil::error::{Result, VigilError};
use vigil::supervisor::{ResourceProbe, ResourceUsage};
use vigil::{
    AlertDispatcher, AlertDispatcherConfig, BrokerMonitor, FixedClock, MarketCalendar,
    StatusStore, Supervisor, SupervisorParts, WorkerControl,
};

/// Market-local timestamp (UTC+05:30)
pub fn ist(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(330 * 60)
        .unwrap()
        .with_ymd_and_hms(y, mo, d, h, mi, 0)
        .unwrap()
}

/// Monday 2026-10-19, 10:00, market open
pub fn market_hours() -> DateTime<FixedOffset> {
    ist(2026, 10, 19, 10, 0)
}

pub fn calendar() -> MarketCalendar {
    MarketCalendar::from_config(&MarketConfig::default()).unwrap()
}

/// How a fake worker responds to `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBehavior {
    /// Comes up and stays up
    Healthy,
    /// Spawns, then exits before the settle check
    DiesImmediately,
    /// Spawn itself fails
    SpawnError,
}

pub struct FakeWorker {
    alive: AtomicBool,
    starts: AtomicU32,
    stops: AtomicU32,
    behavior: Mutex<StartBehavior>,
}

impl FakeWorker {
    pub fn new(alive: bool, behavior: StartBehavior) -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(alive),
            starts: AtomicU32::new(0),
            stops: AtomicU32::new(0),
            behavior: Mutex::new(behavior),
        })
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_up(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn set_behavior(&self, behavior: StartBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }
}

#[async_trait]
impl WorkerControl for FakeWorker {
    async fn is_alive(&self) -> bool {
        self.is_up()
    }

    async fn start(&self) -> Result<u32> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        match *self.behavior.lock().unwrap() {
            StartBehavior::Healthy => {
                self.alive.store(true, Ordering::SeqCst);
                Ok(4242)
            }
            StartBehavior::DiesImmediately => Ok(4243),
            StartBehavior::SpawnError => Err(VigilError::Process("spawn failed".to_string())),
        }
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Broker session answering from scripted queues; an empty queue repeats
/// the fallback
pub struct FakeBrokerSession {
    kind: BrokerKind,
    remediation: Remediation,
    validate: Mutex<VecDeque<std::result::Result<(), ProbeFailure>>>,
    create: Mutex<VecDeque<std::result::Result<(), ProbeFailure>>>,
    fallback: Mutex<std::result::Result<(), ProbeFailure>>,
    pub validate_calls: AtomicU32,
    pub create_calls: AtomicU32,
}

impl FakeBrokerSession {
    /// Session-token broker: a rejected token needs an operator
    pub fn token_broker() -> Self {
        Self::new(BrokerKind::Zerodha, Remediation::Operator)
    }

    /// Credential broker: can log in again on its own
    pub fn credential_broker() -> Self {
        Self::new(BrokerKind::AngelOne, Remediation::Automatic)
    }

    fn new(kind: BrokerKind, remediation: Remediation) -> Self {
        Self {
            kind,
            remediation,
            validate: Mutex::new(VecDeque::new()),
            create: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(())),
            validate_calls: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
        }
    }

    pub fn with_validate(self, results: Vec<std::result::Result<(), ProbeFailure>>) -> Self {
        *self.validate.lock().unwrap() = results.into();
        self
    }

    pub fn with_create(self, results: Vec<std::result::Result<(), ProbeFailure>>) -> Self {
        *self.create.lock().unwrap() = results.into();
        self
    }

    pub fn with_fallback(self, result: std::result::Result<(), ProbeFailure>) -> Self {
        *self.fallback.lock().unwrap() = result;
        self
    }

    pub fn set_fallback(&self, result: std::result::Result<(), ProbeFailure>) {
        *self.fallback.lock().unwrap() = result;
    }

    fn next(
        &self,
        queue: &Mutex<VecDeque<std::result::Result<(), ProbeFailure>>>,
    ) -> std::result::Result<(), ProbeFailure> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}

#[async_trait]
impl BrokerSession for FakeBrokerSession {
    fn kind(&self) -> BrokerKind {
        self.kind
    }

    fn remediation(&self) -> Remediation {
        self.remediation
    }

    fn remediation_steps(&self) -> Vec<String> {
        vec![
            "Log in to the broker console".to_string(),
            "Save the new access token".to_string(),
        ]
    }

    async fn validate_session(&self) -> std::result::Result<(), ProbeFailure> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.next(&self.validate)
    }

    async fn create_session(&self) -> std::result::Result<(), ProbeFailure> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.next(&self.create)
    }
}

#[derive(Default)]
pub struct FakeResources {
    usage: Mutex<ResourceUsage>,
}

impl FakeResources {
    pub fn healthy() -> Arc<Self> {
        Self::with(ResourceUsage {
            disk_pct: Some(40),
            memory_pct: Some(50),
            log_mb: Some(3),
        })
    }

    pub fn with(usage: ResourceUsage) -> Arc<Self> {
        Arc::new(Self {
            usage: Mutex::new(usage),
        })
    }

    pub fn set(&self, usage: ResourceUsage) {
        *self.usage.lock().unwrap() = usage;
    }
}

impl ResourceProbe for FakeResources {
    fn sample(&self) -> ResourceUsage {
        *self.usage.lock().unwrap()
    }
}

/// Channel that records what it was asked to deliver
pub struct RecordingNotifier {
    channel: Channel,
    delivered: Mutex<Vec<Alert>>,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            delivered: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    /// Takes `delay` per call
    pub fn slow(channel: Channel, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            channel,
            delivered: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn delivered(&self) -> Vec<Alert> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn notify(&self, alert: &Alert) -> std::result::Result<(), String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.delivered.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub fn dispatcher(
    dir: &Path,
    clock: Arc<FixedClock>,
    notifiers: Vec<Arc<dyn Notifier>>,
) -> Arc<AlertDispatcher> {
    let mut config = AlertDispatcherConfig::new(dir.join("alerts.log"));
    config.bucket_path = Some(dir.join("alert_rate_bucket.json"));
    Arc::new(AlertDispatcher::new(config, clock, notifiers))
}

pub fn alert_log(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("alerts.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Supervisor wired to fakes, with everything the tests need to poke at
pub struct Harness {
    pub supervisor: Supervisor,
    pub clock: Arc<FixedClock>,
    pub worker: Arc<FakeWorker>,
    pub session: Arc<FakeBrokerSession>,
    pub broker: Arc<BrokerMonitor>,
    pub resources: Arc<FakeResources>,
    pub alerts: Arc<AlertDispatcher>,
    pub store: StatusStore,
    pub webhook: Arc<RecordingNotifier>,
}

pub fn supervisor_config() -> SupervisorConfig {
    SupervisorConfig {
        poll_interval_secs: 60,
        settle_secs: 0,
        step_timeout_secs: 5,
        escalation_threshold: 3,
    }
}

pub fn harness(dir: &Path, worker: Arc<FakeWorker>, session: FakeBrokerSession) -> Harness {
    let clock = Arc::new(FixedClock::new(market_hours()));
    let store = StatusStore::new(dir.join("system_status.json"));
    let webhook = RecordingNotifier::new(Channel::Webhook);
    let alerts = dispatcher(dir, clock.clone(), vec![webhook.clone()]);
    let session = Arc::new(session);
    let broker = Arc::new(BrokerMonitor::new(
        session.clone(),
        store.clone(),
        clock.clone(),
        dir,
    ));
    let resources = FakeResources::healthy();

    let parts = SupervisorParts {
        calendar: calendar(),
        clock: clock.clone(),
        worker: worker.clone(),
        broker: broker.clone(),
        resources: resources.clone(),
        alerts: alerts.clone(),
        store: store.clone(),
    };

    Harness {
        supervisor: Supervisor::new(supervisor_config(), ThresholdConfig::default(), parts),
        clock,
        worker,
        session,
        broker,
        resources,
        alerts,
        store,
        webhook,
    }
}
