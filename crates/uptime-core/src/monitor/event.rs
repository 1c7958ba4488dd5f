use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Recipients;
use crate::monitor::machine::HealthStatus;

/// What happened to a monitor's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OutageStarted,
    OutageContinuing,
    Recovered,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutageStarted => "outage_started",
            Self::OutageContinuing => "outage_continuing",
            Self::Recovered => "recovered",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "outage_started" => Ok(Self::OutageStarted),
            "outage_continuing" => Ok(Self::OutageContinuing),
            "recovered" => Ok(Self::Recovered),
            _ => Err(()),
        }
    }
}

/// A single health transition, emitted by the state machine and fanned out
/// to the notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub id: String,
    pub monitor_name: String,
    pub kind: EventKind,
    pub from_status: HealthStatus,
    pub to_status: HealthStatus,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl TransitionEvent {
    pub fn new(
        monitor_name: impl Into<String>,
        kind: EventKind,
        from_status: HealthStatus,
        to_status: HealthStatus,
        error_detail: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            monitor_name: monitor_name.into(),
            kind,
            from_status,
            to_status,
            occurred_at: Utc::now(),
            error_detail,
        }
    }
}

/// An event paired with the addresses its monitor wants alerted.
#[derive(Debug, Clone)]
pub struct Notification {
    pub event: TransitionEvent,
    pub recipients: Option<Recipients>,
}

/// Channel between the scheduler and the notification dispatcher. Unbounded:
/// event volume is bounded by monitor count and the reminder rate limit.
pub fn notification_channel() -> (
    mpsc::UnboundedSender<Notification>,
    mpsc::UnboundedReceiver<Notification>,
) {
    mpsc::unbounded_channel()
}
