use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::monitor::event::{EventKind, TransitionEvent};
use crate::probe::ProbeOutcome;

/// Resting health of a monitor. Recovery is a transient event, not a status:
/// a monitor that comes back is simply Healthy again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Outage,
    OngoingOutage,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Outage => f.write_str("outage"),
            Self::OngoingOutage => f.write_str("ongoing_outage"),
        }
    }
}

/// Mutable health record owned by one state machine.
#[derive(Debug, Clone)]
pub struct MonitorState {
    pub status: HealthStatus,
    pub last_change_at: DateTime<Utc>,
    pub consecutive_failures: u32,
}

impl MonitorState {
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_change_at: Utc::now(),
            consecutive_failures: 0,
        }
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-monitor health state machine. Feed it probe outcomes in order; it
/// yields at most one transition event per outcome.
///
/// Transitions:
/// - Healthy  + failure ⇒ Outage, emit OutageStarted
/// - Outage   + failure ⇒ OngoingOutage
/// - OngoingOutage + failure ⇒ OngoingOutage, emit OutageContinuing on
///   every `reminder_every`th consecutive failure (0 disables reminders)
/// - any outage + success ⇒ Healthy, emit Recovered
/// - Healthy  + success ⇒ no event
pub struct StateMachine {
    monitor_name: String,
    state: MonitorState,
    reminder_every: u32,
}

impl StateMachine {
    pub fn new(monitor_name: impl Into<String>, reminder_every: u32) -> Self {
        Self {
            monitor_name: monitor_name.into(),
            state: MonitorState::new(),
            reminder_every,
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn status(&self) -> HealthStatus {
        self.state.status
    }

    pub fn apply(&mut self, outcome: &ProbeOutcome) -> Option<TransitionEvent> {
        if outcome.success {
            self.state.consecutive_failures = 0;
            match self.state.status {
                HealthStatus::Healthy => None,
                from @ (HealthStatus::Outage | HealthStatus::OngoingOutage) => {
                    self.state.status = HealthStatus::Healthy;
                    self.state.last_change_at = outcome.timestamp;
                    Some(TransitionEvent::new(
                        &self.monitor_name,
                        EventKind::Recovered,
                        from,
                        HealthStatus::Healthy,
                        None,
                    ))
                }
            }
        } else {
            self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
            match self.state.status {
                HealthStatus::Healthy => {
                    self.state.status = HealthStatus::Outage;
                    self.state.last_change_at = outcome.timestamp;
                    Some(TransitionEvent::new(
                        &self.monitor_name,
                        EventKind::OutageStarted,
                        HealthStatus::Healthy,
                        HealthStatus::Outage,
                        outcome.error_detail.clone(),
                    ))
                }
                HealthStatus::Outage => {
                    self.state.status = HealthStatus::OngoingOutage;
                    self.state.last_change_at = outcome.timestamp;
                    self.reminder()
                        .then(|| self.reminder_event(HealthStatus::Outage, outcome))
                }
                HealthStatus::OngoingOutage => self
                    .reminder()
                    .then(|| self.reminder_event(HealthStatus::OngoingOutage, outcome)),
            }
        }
    }

    fn reminder(&self) -> bool {
        self.reminder_every > 0 && self.state.consecutive_failures % self.reminder_every == 0
    }

    fn reminder_event(&self, from: HealthStatus, outcome: &ProbeOutcome) -> TransitionEvent {
        TransitionEvent::new(
            &self.monitor_name,
            EventKind::OutageContinuing,
            from,
            HealthStatus::OngoingOutage,
            outcome.error_detail.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ok() -> ProbeOutcome {
        ProbeOutcome::ok(Duration::from_millis(10))
    }

    fn fail() -> ProbeOutcome {
        ProbeOutcome::failed("HTTP status 503")
    }

    fn kinds(machine: &mut StateMachine, outcomes: &[bool]) -> Vec<EventKind> {
        outcomes
            .iter()
            .filter_map(|&success| {
                let outcome = if success { ok() } else { fail() };
                machine.apply(&outcome).map(|e| e.kind)
            })
            .collect()
    }

    #[test]
    fn outage_then_recovery_emits_one_event_each() {
        let mut machine = StateMachine::new("api", 10);
        let events = kinds(&mut machine, &[false, false, false, true]);
        assert_eq!(events, vec![EventKind::OutageStarted, EventKind::Recovered]);
        assert_eq!(machine.status(), HealthStatus::Healthy);
        assert_eq!(machine.state().consecutive_failures, 0);
    }

    #[test]
    fn repeated_success_stays_quiet() {
        let mut machine = StateMachine::new("api", 10);
        assert!(kinds(&mut machine, &[true, true, true]).is_empty());
        assert_eq!(machine.status(), HealthStatus::Healthy);
    }

    #[test]
    fn second_failure_escalates_to_ongoing_outage() {
        let mut machine = StateMachine::new("api", 10);
        machine.apply(&fail());
        machine.apply(&fail());
        assert_eq!(machine.status(), HealthStatus::OngoingOutage);
        assert_eq!(machine.state().consecutive_failures, 2);
    }

    #[test]
    fn no_second_outage_started_without_recovery_in_between() {
        let mut machine = StateMachine::new("api", 0);
        let events = kinds(&mut machine, &[false, false, false, false, false]);
        assert_eq!(events, vec![EventKind::OutageStarted]);
    }

    #[test]
    fn reminders_fire_on_the_configured_cadence() {
        let mut machine = StateMachine::new("api", 3);
        let events = kinds(&mut machine, &[false; 7]);
        // OutageStarted at failure 1, reminders at failures 3 and 6.
        assert_eq!(
            events,
            vec![
                EventKind::OutageStarted,
                EventKind::OutageContinuing,
                EventKind::OutageContinuing,
            ]
        );
    }

    #[test]
    fn zero_cadence_disables_reminders() {
        let mut machine = StateMachine::new("api", 0);
        let events = kinds(&mut machine, &[false; 20]);
        assert_eq!(events, vec![EventKind::OutageStarted]);
    }

    #[test]
    fn outage_started_carries_the_probe_error_detail() {
        let mut machine = StateMachine::new("api", 10);
        let event = machine.apply(&fail()).unwrap();
        assert_eq!(event.error_detail.as_deref(), Some("HTTP status 503"));
        assert_eq!(event.from_status, HealthStatus::Healthy);
        assert_eq!(event.to_status, HealthStatus::Outage);
    }

    #[test]
    fn recovery_resets_the_reminder_window() {
        let mut machine = StateMachine::new("api", 2);
        kinds(&mut machine, &[false, false, true]);
        // Fresh outage: reminder should need two more failures again.
        let events = kinds(&mut machine, &[false, false]);
        assert_eq!(
            events,
            vec![EventKind::OutageStarted, EventKind::OutageContinuing]
        );
    }
}
