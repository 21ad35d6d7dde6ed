mod common;

use common::*;
use vigil::broker::ProbeFailure;
use vigil::domain::{
    BotStatus, BrokerConnectionState, ConfidenceBand, DecisionSource, MarketStatus, Severity,
    ValidationSummary,
};
use vigil::supervisor::{Finding, ResourceUsage};

/// A dead worker during market hours gets exactly one restart attempt.
#[tokio::test]
async fn dead_worker_is_restarted_once() {
    let dir = tempfile::tempdir().unwrap();
    let worker = FakeWorker::new(false, StartBehavior::Healthy);
    let mut h = harness(dir.path(), worker.clone(), FakeBrokerSession::token_broker());

    let report = h.supervisor.tick().await.unwrap();

    assert_eq!(worker.starts(), 1);
    assert_eq!(report.snapshot.bot_status, BotStatus::Restarted);
    assert!(report.snapshot.bot_running);
    assert!(report
        .findings
        .contains(&Finding::WorkerRestarted { pid: Some(4242) }));
    assert_eq!(report.snapshot.issues_count, 1);

    let log = alert_log(dir.path());
    assert_eq!(log.len(), 1, "one alert logged, got {log:?}");
    assert!(log[0].contains("[LOW]"));

    // LOW goes to the log only
    h.alerts.flush().await;
    assert!(h.webhook.delivered().is_empty());

    // Next tick finds it running and does nothing
    let report = h.supervisor.tick().await.unwrap();
    assert_eq!(worker.starts(), 1);
    assert_eq!(report.snapshot.bot_status, BotStatus::Running);
    assert_eq!(report.snapshot.issues_count, 0);
}

/// A restart that does not stick is reported HIGH and not retried in the same tick.
#[tokio::test]
async fn failed_restart_is_high_and_single_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let worker = FakeWorker::new(false, StartBehavior::DiesImmediately);
    let mut h = harness(dir.path(), worker.clone(), FakeBrokerSession::token_broker());

    let report = h.supervisor.tick().await.unwrap();
    h.alerts.flush().await;

    assert_eq!(worker.starts(), 1, "exactly one restart attempt per tick");
    assert_eq!(report.snapshot.bot_status, BotStatus::FailedRestart);
    assert!(!report.snapshot.bot_running);

    let delivered = h.webhook.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].severity, Severity::High);
}

/// A spawn error counts as a failed restart, not a tick failure.
#[tokio::test]
async fn spawn_error_is_a_failed_restart() {
    let dir = tempfile::tempdir().unwrap();
    let worker = FakeWorker::new(false, StartBehavior::SpawnError);
    let mut h = harness(dir.path(), worker.clone(), FakeBrokerSession::token_broker());

    let report = h.supervisor.tick().await.unwrap();
    assert_eq!(report.snapshot.bot_status, BotStatus::FailedRestart);
    assert!(matches!(
        report.findings.first(),
        Some(Finding::WorkerRestartFailed { detail }) if detail.contains("spawn failed")
    ));
}

/// Three consecutive ticks with issues escalate once, then the counter restarts.
#[tokio::test]
async fn three_bad_ticks_escalate_once_and_reset() {
    let dir = tempfile::tempdir().unwrap();
    let worker = FakeWorker::new(false, StartBehavior::DiesImmediately);
    let mut h = harness(dir.path(), worker.clone(), FakeBrokerSession::token_broker());

    let first = h.supervisor.tick().await.unwrap();
    let second = h.supervisor.tick().await.unwrap();
    assert!(!first.escalated && !second.escalated);
    assert_eq!(second.consecutive_failures, 2);

    let third = h.supervisor.tick().await.unwrap();
    assert!(third.escalated);
    assert_eq!(third.consecutive_failures, 0);
    assert_eq!(h.supervisor.consecutive_failures(), 0);

    let critical = alert_log(dir.path())
        .iter()
        .filter(|line| line.contains("[CRITICAL]"))
        .count();
    assert_eq!(critical, 1);

    // Fourth tick starts counting from zero again
    let fourth = h.supervisor.tick().await.unwrap();
    assert!(!fourth.escalated);
    assert_eq!(fourth.consecutive_failures, 1);
}

/// A clean tick breaks the streak.
#[tokio::test]
async fn clean_tick_resets_streak() {
    let dir = tempfile::tempdir().unwrap();
    let worker = FakeWorker::new(false, StartBehavior::DiesImmediately);
    let mut h = harness(dir.path(), worker.clone(), FakeBrokerSession::token_broker());

    h.supervisor.tick().await.unwrap();
    worker.set_behavior(StartBehavior::Healthy);
    h.supervisor.tick().await.unwrap(); // restarted: still an issue
    assert_eq!(h.supervisor.consecutive_failures(), 2);

    let clean = h.supervisor.tick().await.unwrap();
    assert_eq!(clean.snapshot.issues_count, 0);
    assert_eq!(clean.consecutive_failures, 0);
}

/// Disk above threshold yields one MEDIUM issue per tick.
#[tokio::test]
async fn disk_breach_is_one_medium_per_tick() {
    let dir = tempfile::tempdir().unwrap();
    let worker = FakeWorker::new(true, StartBehavior::Healthy);
    let mut h = harness(dir.path(), worker, FakeBrokerSession::token_broker());
    h.resources.set(ResourceUsage {
        disk_pct: Some(92),
        memory_pct: Some(40),
        log_mb: Some(1),
    });

    for _ in 0..2 {
        let report = h.supervisor.tick().await.unwrap();
        assert_eq!(report.snapshot.issues_count, 1);
        assert_eq!(report.snapshot.disk_usage_pct, Some(92));
        assert_eq!(
            report.findings,
            vec![Finding::HighDiskUsage {
                percent: 92,
                threshold: 90
            }]
        );
    }

    let log = alert_log(dir.path());
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|line| line.contains("[MEDIUM]")));

    let stored = h.store.load().health.unwrap();
    assert_eq!(stored.disk_usage_pct, Some(92));
}

/// Outside market hours the loop only records a standby snapshot.
#[tokio::test]
async fn standby_takes_no_action() {
    let dir = tempfile::tempdir().unwrap();
    let worker = FakeWorker::new(false, StartBehavior::Healthy);
    let mut h = harness(dir.path(), worker.clone(), FakeBrokerSession::token_broker());
    h.clock.set(ist(2026, 10, 19, 20, 0));

    let report = h.supervisor.tick().await.unwrap();

    assert_eq!(worker.starts(), 0);
    assert_eq!(h.session.validate_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(report.snapshot.market_status, MarketStatus::Standby);
    assert!(!report.snapshot.market_open);
    assert_eq!(report.snapshot.bot_status, BotStatus::Stopped);
    assert_eq!(report.snapshot.disk_usage_pct, None);
    assert!(alert_log(dir.path()).is_empty());
    assert_eq!(
        h.store.load().health.unwrap().market_status,
        MarketStatus::Standby
    );
}

/// A worker held by today's decision is not restarted.
#[tokio::test]
async fn held_worker_is_not_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let worker = FakeWorker::new(false, StartBehavior::Healthy);
    let mut h = harness(dir.path(), worker.clone(), FakeBrokerSession::token_broker());
    h.store
        .write_validation(&ValidationSummary {
            trading_day: market_hours().date_naive(),
            trading_ready: false,
            confidence_score: 0.12,
            band: ConfidenceBand::Minimal,
            source: DecisionSource::Full,
            rationale: vec!["confidence 0.12 below minimum 0.40".to_string()],
            launch_action: None,
            decided_at: ist(2026, 10, 19, 8, 45),
        })
        .unwrap();

    let report = h.supervisor.tick().await.unwrap();

    assert_eq!(worker.starts(), 0);
    assert_eq!(report.snapshot.bot_status, BotStatus::Held);
    assert_eq!(report.snapshot.issues_count, 0);
    assert!(alert_log(dir.path()).is_empty());
}

/// An expired token that cannot be refreshed ends in manual intervention,
/// and a fresh token clears it.
#[tokio::test]
async fn expired_token_requires_operator_until_refreshed() {
    let dir = tempfile::tempdir().unwrap();
    let worker = FakeWorker::new(true, StartBehavior::Healthy);
    let session = FakeBrokerSession::token_broker()
        .with_fallback(Err(ProbeFailure::Rejected("Incorrect `api_key` or `access_token`.".into())));
    let mut h = harness(dir.path(), worker, session);

    let report = h.supervisor.tick().await.unwrap();
    h.alerts.flush().await;

    assert_eq!(
        report.snapshot.broker_status,
        BrokerConnectionState::ManualInterventionRequired
    );
    assert!(h.broker.notice_path().exists());
    let notice = std::fs::read_to_string(h.broker.notice_path()).unwrap();
    assert!(notice.contains("Save the new access token"));

    let delivered = h.webhook.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].severity, Severity::Critical);
    assert!(delivered[0].message.contains("Incorrect `api_key` or `access_token`."));

    // Operator saves a new token
    h.session.set_fallback(Ok(()));
    let report = h.supervisor.tick().await.unwrap();
    assert_eq!(report.snapshot.broker_status, BrokerConnectionState::Connected);
    assert!(!h.broker.notice_path().exists());
}
