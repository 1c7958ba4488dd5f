mod smtp;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{is_valid_email, Recipients};
use crate::monitor::event::{EventKind, Notification, TransitionEvent};

pub use smtp::{SmtpConfig, SmtpMailer};

/// Failures on the notification path. All of them are logged and swallowed
/// by the dispatcher; a broken mail setup never takes down the polling loop.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Email template missing required fields: {}", missing.join(", "))]
    Template { missing: Vec<String> },
    #[error("No valid recipients: {0}")]
    Recipients(String),
    #[error("SMTP authentication failed: {0}")]
    SmtpAuth(String),
    #[error("SMTP server error: {0}")]
    Smtp(String),
    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// A rendered alert email, ready to hand to a mailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

/// Sends rendered messages. Production uses SMTP; tests record in memory.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Fields every alert template must provide.
pub const REQUIRED_CONTEXT_FIELDS: [&str; 5] = [
    "service_name",
    "event_timestamp",
    "status_action",
    "event_description",
    "time_label",
];

/// Template context for an event. The per-kind presets give each alert its
/// action word, description, and timestamp label.
pub fn template_context(event: &TransitionEvent) -> HashMap<String, String> {
    let (action, description, time_label) = match event.kind {
        EventKind::OutageStarted => (
            "ALERT",
            "the monitored service became unreachable",
            "Occurred at",
        ),
        EventKind::OutageContinuing => (
            "STILL DOWN",
            "the monitored service is still unreachable",
            "Checked at",
        ),
        EventKind::Recovered => (
            "RECOVERED",
            "the monitored service is reachable again",
            "Recovered at",
        ),
    };

    let mut context = HashMap::from([
        ("service_name".to_string(), event.monitor_name.clone()),
        (
            "event_timestamp".to_string(),
            event.occurred_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
        ("status_action".to_string(), action.to_string()),
        ("event_description".to_string(), description.to_string()),
        ("time_label".to_string(), time_label.to_string()),
    ]);
    if let Some(detail) = &event.error_detail {
        context.insert("error_detail".to_string(), detail.clone());
    }
    context
}

/// Render subject and body from a context. Fails without sending anything
/// when a required field is absent.
pub fn render_email(context: &HashMap<String, String>) -> Result<(String, String), NotifyError> {
    let mut missing: Vec<String> = REQUIRED_CONTEXT_FIELDS
        .iter()
        .filter(|k| !context.contains_key(**k))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(NotifyError::Template { missing });
    }

    let field = |k: &str| context.get(k).cloned().unwrap_or_default();

    let subject = format!("[{}] {}", field("status_action"), field("service_name"));
    let mut body = format!(
        "Service: {}\nStatus: {}\n\nThis is an automated notification: {}.\n{}: {}\n",
        field("service_name"),
        field("status_action"),
        field("event_description"),
        field("time_label"),
        field("event_timestamp"),
    );
    if let Some(detail) = context.get("error_detail") {
        body.push_str(&format!("Detail: {detail}\n"));
    }
    Ok((subject, body))
}

/// Flatten and syntax-check recipient addresses. An empty result is an
/// error: a notification with nowhere to go is a configuration problem.
pub fn resolve_recipients(recipients: Option<&Recipients>) -> Result<Vec<String>, NotifyError> {
    let resolved: Vec<String> = recipients
        .map(Recipients::resolve)
        .unwrap_or_default()
        .into_iter()
        .filter(|a| is_valid_email(a))
        .collect();
    if resolved.is_empty() {
        return Err(NotifyError::Recipients(
            "no valid notification addresses configured".to_string(),
        ));
    }
    Ok(resolved)
}

/// Consumes the notification channel and emails configured event kinds.
/// Runs until the sending side is dropped.
pub struct EmailDispatcher {
    rx: mpsc::UnboundedReceiver<Notification>,
    notify_on: Vec<EventKind>,
    mailer: Arc<dyn Mailer>,
}

impl EmailDispatcher {
    pub fn new(rx: mpsc::UnboundedReceiver<Notification>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            rx,
            notify_on: vec![EventKind::OutageStarted, EventKind::Recovered],
            mailer,
        }
    }

    pub fn with_notify_on(mut self, notify_on: Vec<EventKind>) -> Self {
        self.notify_on = notify_on;
        self
    }

    pub async fn run(mut self) {
        debug!(notify_on = ?self.notify_on, "email dispatcher started");
        while let Some(notification) = self.rx.recv().await {
            let event = &notification.event;
            if !self.notify_on.contains(&event.kind) {
                continue;
            }
            match self.dispatch(&notification).await {
                Ok(sent_to) => {
                    info!(
                        monitor = %event.monitor_name,
                        kind = %event.kind,
                        recipients = sent_to,
                        "alert email sent"
                    );
                }
                Err(e) => {
                    warn!(
                        monitor = %event.monitor_name,
                        kind = %event.kind,
                        error = %e,
                        "alert email not sent"
                    );
                }
            }
        }
        debug!("email dispatcher shut down");
    }

    async fn dispatch(&self, notification: &Notification) -> Result<usize, NotifyError> {
        let recipients = resolve_recipients(notification.recipients.as_ref())?;
        let context = template_context(&notification.event);
        let (subject, body) = render_email(&context)?;
        let message = EmailMessage {
            subject,
            body,
            recipients,
        };
        self.mailer.send(&message).await?;
        Ok(message.recipients.len())
    }
}
