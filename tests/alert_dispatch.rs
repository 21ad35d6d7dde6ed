mod common;

use common::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vigil::adapters::Notifier;
use vigil::domain::{Channel, Severity};
use vigil::{AlertDispatcher, AlertDispatcherConfig, FixedClock};

/// Within one hour no more than the ceiling is sent, yet every alert is logged.
#[tokio::test]
async fn ceiling_limits_notifications_but_never_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock::new(market_hours()));
    let webhook = RecordingNotifier::new(Channel::Webhook);
    let alerts = dispatcher(dir.path(), clock.clone(), vec![webhook.clone() as Arc<dyn Notifier>]);

    let mut suppressed = 0;
    for i in 0..15 {
        let outcome = alerts.dispatch(Severity::High, format!("issue {i}")).await;
        assert!(outcome.logged);
        if outcome.suppressed {
            suppressed += 1;
        }
    }
    alerts.flush().await;

    assert_eq!(webhook.delivered().len(), 10);
    assert_eq!(suppressed, 5);
    assert_eq!(alerts.suppressed_count().await, 5);
    assert_eq!(alert_log(dir.path()).len(), 15);
}

/// A new hour key starts a fresh budget.
#[tokio::test]
async fn next_hour_resets_the_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock::new(ist(2026, 10, 19, 10, 59)));
    let webhook = RecordingNotifier::new(Channel::Webhook);
    let alerts = dispatcher(dir.path(), clock.clone(), vec![webhook.clone() as Arc<dyn Notifier>]);

    for _ in 0..12 {
        alerts.dispatch(Severity::Medium, "disk").await;
    }
    clock.set(ist(2026, 10, 19, 11, 0));
    let outcome = alerts.dispatch(Severity::Medium, "disk").await;
    alerts.flush().await;

    assert!(!outcome.suppressed);
    assert_eq!(webhook.delivered().len(), 11);
    let bucket = alerts.bucket().await;
    assert_eq!(bucket.hour_key, 2026101911);
    assert_eq!(bucket.count, 1);
}

/// The persisted bucket makes the ceiling hold across dispatcher instances.
#[tokio::test]
async fn bucket_is_shared_through_the_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock::new(market_hours()));

    let first = dispatcher(dir.path(), clock.clone(), Vec::new());
    for _ in 0..8 {
        first.dispatch(Severity::High, "from supervisor").await;
    }

    let webhook = RecordingNotifier::new(Channel::Webhook);
    let second = dispatcher(dir.path(), clock.clone(), vec![webhook.clone() as Arc<dyn Notifier>]);
    let mut admitted = 0;
    for _ in 0..5 {
        if !second.dispatch(Severity::High, "from morning job").await.suppressed {
            admitted += 1;
        }
    }
    second.flush().await;

    assert_eq!(admitted, 2);
    assert_eq!(webhook.delivered().len(), 2);
}

/// Routing follows severity; LOW and INFO reach only the log.
#[tokio::test]
async fn channels_follow_severity() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock::new(market_hours()));
    let desktop = RecordingNotifier::new(Channel::Desktop);
    let audio = RecordingNotifier::new(Channel::Audio);
    let webhook = RecordingNotifier::new(Channel::Webhook);
    let alerts = dispatcher(
        dir.path(),
        clock,
        vec![
            desktop.clone() as Arc<dyn Notifier>,
            audio.clone() as Arc<dyn Notifier>,
            webhook.clone() as Arc<dyn Notifier>,
        ],
    );

    let low = alerts.dispatch(Severity::Low, "log rotated").await;
    let medium = alerts.dispatch(Severity::Medium, "memory").await;
    let critical = alerts.dispatch(Severity::Critical, "escalation").await;
    alerts.flush().await;

    assert!(low.channels.is_empty());
    assert_eq!(medium.channels, vec![Channel::Desktop, Channel::Webhook]);
    assert_eq!(
        critical.channels,
        vec![Channel::Desktop, Channel::Audio, Channel::Webhook]
    );
    assert_eq!(desktop.delivered().len(), 2);
    assert_eq!(audio.delivered().len(), 1);
    assert_eq!(webhook.delivered().len(), 2);

    let log = alert_log(dir.path());
    assert_eq!(log.len(), 3);
    assert!(log[0].ends_with("[LOW] log rotated"));
}

/// A slow channel neither blocks the caller nor outlives its timeout.
#[tokio::test]
async fn slow_channel_does_not_block_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock::new(market_hours()));
    let slow = RecordingNotifier::slow(Channel::Webhook, Duration::from_secs(30));

    let mut config = AlertDispatcherConfig::new(dir.path().join("alerts.log"));
    config.channel_timeout = Duration::from_millis(50);
    let alerts = AlertDispatcher::new(config, clock, vec![slow.clone() as Arc<dyn Notifier>]);

    let started = Instant::now();
    let outcome = alerts.dispatch(Severity::Critical, "broker down").await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(outcome.channels, vec![Channel::Webhook]);

    alerts.flush().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(slow.delivered().is_empty());
    assert_eq!(alert_log(dir.path()).len(), 1);
}
