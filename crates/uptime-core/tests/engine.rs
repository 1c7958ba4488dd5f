use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uptime_core::monitor::event::notification_channel;
use uptime_core::{
    EngineConfig, EventKind, HealthStatus, MonitorSpec, MonitorType, ProbeOutcome, ProbeRegistry,
    Prober, ScheduleError, Scheduler,
};

/// Prober that replays a scripted outcome sequence, then succeeds forever.
struct ScriptedProber {
    outcomes: Arc<Mutex<VecDeque<ProbeOutcome>>>,
}

impl ScriptedProber {
    fn new(script: Vec<ProbeOutcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(script.into())),
        }
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, _spec: &MonitorSpec, _timeout: Duration) -> ProbeOutcome {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ProbeOutcome::ok(Duration::from_millis(5)))
    }
}

fn scripted_registry(script: Vec<ProbeOutcome>) -> Arc<ProbeRegistry> {
    let mut registry = ProbeRegistry::new();
    registry.register(MonitorType::Http, Arc::new(ScriptedProber::new(script)));
    Arc::new(registry)
}

/// Prober whose checks take a while, for exercising in-flight drains.
struct SlowProber {
    delay: Duration,
}

#[async_trait]
impl Prober for SlowProber {
    async fn probe(&self, _spec: &MonitorSpec, _timeout: Duration) -> ProbeOutcome {
        tokio::time::sleep(self.delay).await;
        ProbeOutcome::failed("HTTP status 503")
    }
}

fn slow_registry(delay: Duration) -> Arc<ProbeRegistry> {
    let mut registry = ProbeRegistry::new();
    registry.register(MonitorType::Http, Arc::new(SlowProber { delay }));
    Arc::new(registry)
}

fn spec(name: &str, interval: u64) -> MonitorSpec {
    MonitorSpec {
        name: name.to_string(),
        monitor_type: "HTTP".to_string(),
        url: "https://svc.example/health".to_string(),
        interval_seconds: interval,
        headers: None,
        payload: None,
        notify_emails: None,
    }
}

fn fail(detail: &str) -> ProbeOutcome {
    ProbeOutcome::failed(detail)
}

fn ok() -> ProbeOutcome {
    ProbeOutcome::ok(Duration::from_millis(5))
}

#[tokio::test(start_paused = true)]
async fn outage_and_recovery_flow_through_the_notification_channel() {
    let registry = scripted_registry(vec![fail("HTTP status 503"), fail("x"), fail("x"), ok()]);
    let (tx, mut rx) = notification_channel();
    let scheduler = Scheduler::new(EngineConfig::default(), registry, Some(tx));
    scheduler.register(spec("api", 1)).unwrap();

    let first = tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("no event before timeout")
        .expect("channel closed");
    assert_eq!(first.event.kind, EventKind::OutageStarted);
    assert_eq!(first.event.monitor_name, "api");
    assert_eq!(first.event.error_detail.as_deref(), Some("HTTP status 503"));

    let second = tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("no event before timeout")
        .expect("channel closed");
    assert_eq!(second.event.kind, EventKind::Recovered);
    assert_eq!(second.event.to_status, HealthStatus::Healthy);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn status_snapshot_tracks_the_latest_outcome() {
    let registry = scripted_registry(vec![fail("HTTP status 500")]);
    let scheduler = Scheduler::new(EngineConfig::default(), registry, None);
    scheduler.register(spec("api", 1)).unwrap();

    // First tick fires immediately; give the task a chance to run it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = scheduler.status("api").expect("status present");
    assert_eq!(status.status, HealthStatus::Outage);
    assert_eq!(status.consecutive_failures, 1);
    assert!(status.last_checked.is_some());

    // Next tick replays the default success.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let status = scheduler.status("api").expect("status present");
    assert_eq!(status.status, HealthStatus::Healthy);
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.latency_ms.is_some());

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn reregistering_a_name_resets_its_state() {
    let registry = scripted_registry(vec![fail("x"), fail("x"), fail("x")]);
    let scheduler = Scheduler::new(EngineConfig::default(), registry, None);
    scheduler.register(spec("api", 1)).unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_ne!(
        scheduler.status("api").unwrap().status,
        HealthStatus::Healthy
    );

    // Same name, fresh registration: counters start over.
    scheduler.register(spec("api", 1)).unwrap();
    let status = scheduler.status("api").unwrap();
    assert_eq!(status.status, HealthStatus::Healthy);
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.last_checked.is_none());
    assert_eq!(scheduler.len(), 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unregister_removes_task_and_status() {
    let registry = scripted_registry(vec![]);
    let scheduler = Scheduler::new(EngineConfig::default(), registry, None);
    scheduler.register(spec("api", 1)).unwrap();
    scheduler.register(spec("db", 1)).unwrap();
    assert_eq!(scheduler.len(), 2);

    assert!(scheduler.unregister("api"));
    assert!(!scheduler.unregister("api"));
    assert!(scheduler.status("api").is_none());
    assert!(scheduler.contains("db"));
    assert_eq!(scheduler.statuses().len(), 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unregister_during_inflight_probe_leaves_no_status() {
    let registry = slow_registry(Duration::from_millis(500));
    let scheduler = Scheduler::new(EngineConfig::default(), registry, None);
    scheduler.register(spec("api", 1)).unwrap();

    // Let the task start its first probe, then remove the monitor while
    // the probe is still sleeping.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(scheduler.unregister("api"));
    assert!(scheduler.status("api").is_none());

    // The drained probe completes; it must not write the snapshot back.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(scheduler.status("api").is_none());
    assert!(scheduler.statuses().is_empty());
}

#[tokio::test(start_paused = true)]
async fn replacing_during_inflight_probe_keeps_fresh_state() {
    let registry = slow_registry(Duration::from_millis(500));
    let scheduler = Scheduler::new(EngineConfig::default(), registry, None);
    scheduler.register(spec("api", 1)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Replace while the old instance's probe is still in flight.
    scheduler.register(spec("api", 1)).unwrap();

    // The old probe drains at t+500ms; the replacement's own probe only
    // lands at t+600ms, so in between the snapshot must still be the
    // untouched initial one, not the old instance's failure.
    tokio::time::sleep(Duration::from_millis(450)).await;
    let status = scheduler.status("api").unwrap();
    assert_eq!(status.status, HealthStatus::Healthy);
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.last_checked.is_none());

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn register_rejects_unknown_monitor_type() {
    let registry = Arc::new(ProbeRegistry::new());
    let scheduler = Scheduler::new(EngineConfig::default(), registry, None);

    let err = scheduler.register(spec("api", 1)).unwrap_err();
    assert!(matches!(err, ScheduleError::NoProber(t) if t == "HTTP"));
    assert!(scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_drains_all_monitors() {
    let registry = scripted_registry(vec![]);
    let scheduler = Scheduler::new(EngineConfig::default(), registry, None);
    scheduler
        .start(vec![spec("a", 1), spec("b", 2), spec("c", 3)])
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    scheduler.stop().await;
    assert!(scheduler.is_empty());
    // stop() is idempotent.
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn reminder_events_follow_the_configured_cadence() {
    let registry = scripted_registry(vec![
        fail("x"),
        fail("x"),
        fail("x"),
        fail("x"),
        fail("x"),
        ok(),
    ]);
    let (tx, mut rx) = notification_channel();
    let config = EngineConfig::default().with_reminder_every(2);
    let scheduler = Scheduler::new(config, registry, Some(tx));
    scheduler.register(spec("api", 1)).unwrap();

    let mut kinds = Vec::new();
    for _ in 0..4 {
        let n = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("no event before timeout")
            .expect("channel closed");
        kinds.push(n.event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            EventKind::OutageStarted,
            EventKind::OutageContinuing,
            EventKind::OutageContinuing,
            EventKind::Recovered,
        ]
    );

    scheduler.stop().await;
}
