use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, MonitorSpec};
use crate::monitor::event::Notification;
use crate::monitor::machine::{HealthStatus, StateMachine};
use crate::probe::{ProbeRegistry, Prober};

/// Point-in-time health snapshot of one monitor, for pull consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub monitor_name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub last_change_at: DateTime<Utc>,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("No prober registered for monitor type '{0}'")]
    NoProber(String),
}

struct MonitorHandle {
    spec: MonitorSpec,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Runs one polling task per registered monitor.
///
/// Each task owns its monitor's state machine, so outcomes are applied in
/// the order probes were issued. Ticks fire relative to the scheduled time;
/// a tick that would overlap a still-running probe of the same monitor is
/// skipped rather than queued.
pub struct Scheduler {
    config: EngineConfig,
    registry: Arc<ProbeRegistry>,
    monitors: Arc<DashMap<String, MonitorHandle>>,
    statuses: Arc<DashMap<String, MonitorStatus>>,
    probe_permits: Arc<Semaphore>,
    notification_tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl Scheduler {
    pub fn new(
        config: EngineConfig,
        registry: Arc<ProbeRegistry>,
        notification_tx: Option<mpsc::UnboundedSender<Notification>>,
    ) -> Self {
        let probe_permits = Arc::new(Semaphore::new(config.max_concurrent_probes));
        Self {
            config,
            registry,
            monitors: Arc::new(DashMap::new()),
            statuses: Arc::new(DashMap::new()),
            probe_permits,
            notification_tx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start polling a monitor. Re-registering an existing name stops the
    /// old task first and starts over with a clean state machine.
    pub fn register(&self, spec: MonitorSpec) -> Result<(), ScheduleError> {
        let monitor_type = spec
            .parsed_type()
            .ok_or_else(|| ScheduleError::NoProber(spec.monitor_type.clone()))?;
        let prober = self
            .registry
            .get(monitor_type)
            .ok_or_else(|| ScheduleError::NoProber(spec.monitor_type.clone()))?;

        if let Some((_, old)) = self.monitors.remove(&spec.name) {
            debug!(monitor = %spec.name, "replacing running monitor");
            // Signal before the fresh status goes in, so a draining probe
            // of the old instance cannot write over it.
            let _ = old.shutdown_tx.send(true);
            tokio::spawn(Self::retire(old, self.config.shutdown_deadline));
        }

        let name = spec.name.clone();
        self.statuses.insert(
            name.clone(),
            MonitorStatus {
                monitor_name: name.clone(),
                status: HealthStatus::Healthy,
                latency_ms: None,
                last_change_at: Utc::now(),
                consecutive_failures: 0,
                last_checked: None,
            },
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = self.spawn_monitor_task(spec.clone(), prober, shutdown_rx);
        self.monitors.insert(
            name.clone(),
            MonitorHandle {
                spec,
                shutdown_tx,
                task,
            },
        );
        info!(monitor = %name, "monitor registered");
        Ok(())
    }

    /// Stop polling a monitor and drop its status. Returns false when no
    /// monitor with that name is running.
    pub fn unregister(&self, name: &str) -> bool {
        let Some((_, handle)) = self.monitors.remove(name) else {
            return false;
        };
        let _ = handle.shutdown_tx.send(true);
        self.statuses.remove(name);
        info!(monitor = %name, "monitor unregistered");
        tokio::spawn(Self::retire(handle, self.config.shutdown_deadline));
        true
    }

    /// Register a batch, stopping at the first monitor that cannot start.
    pub fn start(&self, specs: Vec<MonitorSpec>) -> Result<(), ScheduleError> {
        for spec in specs {
            self.register(spec)?;
        }
        Ok(())
    }

    /// Stop all monitors. In-flight probes get to finish and have their
    /// outcome applied, bounded by the shutdown deadline; anything still
    /// running after that is aborted.
    pub async fn stop(&self) {
        let handles: Vec<MonitorHandle> = self
            .monitors
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|name| self.monitors.remove(&name).map(|(_, h)| h))
            .collect();

        if handles.is_empty() {
            return;
        }
        info!(count = handles.len(), "stopping all monitors");
        let deadline = self.config.shutdown_deadline;
        futures::future::join_all(
            handles
                .into_iter()
                .map(|handle| Self::retire(handle, deadline)),
        )
        .await;
    }

    async fn retire(handle: MonitorHandle, deadline: Duration) {
        let MonitorHandle {
            spec,
            shutdown_tx,
            mut task,
        } = handle;
        let _ = shutdown_tx.send(true);
        if tokio::time::timeout(deadline, &mut task).await.is_err() {
            warn!(monitor = %spec.name, "monitor task did not drain in time, aborting");
            task.abort();
        }
    }

    pub fn statuses(&self) -> Vec<MonitorStatus> {
        let mut all: Vec<MonitorStatus> = self
            .statuses
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.monitor_name.cmp(&b.monitor_name));
        all
    }

    pub fn status(&self, name: &str) -> Option<MonitorStatus> {
        self.statuses.get(name).map(|entry| entry.value().clone())
    }

    pub fn specs(&self) -> Vec<MonitorSpec> {
        let mut all: Vec<MonitorSpec> = self
            .monitors
            .iter()
            .map(|entry| entry.value().spec.clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn spec(&self, name: &str) -> Option<MonitorSpec> {
        self.monitors.get(name).map(|entry| entry.value().spec.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.monitors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    fn spawn_monitor_task(
        &self,
        spec: MonitorSpec,
        prober: Arc<dyn Prober>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let interval = spec.interval();
        let timeout = self.config.probe_timeout_for(interval);
        let reminder_every = self.config.reminder_every;
        let statuses = Arc::clone(&self.statuses);
        let permits = Arc::clone(&self.probe_permits);
        let notification_tx = self.notification_tx.clone();

        tokio::spawn(async move {
            let mut machine = StateMachine::new(&spec.name, reminder_every);
            // First tick completes immediately, so a new monitor is probed
            // right away.
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(
                monitor = %spec.name,
                interval_s = interval.as_secs(),
                timeout_ms = timeout.as_millis() as u64,
                "monitor task started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                let outcome = {
                    let _permit = permits.acquire().await.ok();
                    prober.probe(&spec, timeout).await
                };

                let event = machine.apply(&outcome);

                // Retirement may have been signalled mid-probe. The outcome
                // above still reached the state machine, but the snapshot
                // belongs to an instance that no longer exists and must not
                // be written back.
                let retired = *shutdown_rx.borrow();
                if !retired {
                    let state = machine.state();
                    statuses.insert(
                        spec.name.clone(),
                        MonitorStatus {
                            monitor_name: spec.name.clone(),
                            status: state.status,
                            latency_ms: outcome.latency.map(|l| l.as_millis() as u64),
                            last_change_at: state.last_change_at,
                            consecutive_failures: state.consecutive_failures,
                            last_checked: Some(outcome.timestamp),
                        },
                    );
                }

                if let Some(event) = event {
                    info!(
                        monitor = %event.monitor_name,
                        kind = %event.kind,
                        from = %event.from_status,
                        to = %event.to_status,
                        "health transition"
                    );
                    if let Some(tx) = &notification_tx {
                        let _ = tx.send(Notification {
                            event,
                            recipients: spec.notify_emails.clone(),
                        });
                    }
                }

                if retired {
                    break;
                }
            }
            debug!(monitor = %spec.name, "monitor task stopped");
        })
    }
}
