#![forbid(unsafe_code)]

pub mod config;
pub mod monitor;
pub mod notify;
pub mod probe;

pub use config::{
    validate_spec, validate_specs, ConfigError, EngineConfig, MonitorSpec, MonitorType, Recipients,
};
pub use monitor::{
    notification_channel, EventKind, HealthStatus, MonitorState, MonitorStatus, Notification,
    ScheduleError, Scheduler, StateMachine, TransitionEvent,
};
pub use notify::{
    EmailDispatcher, EmailMessage, Mailer, NotifyError, SmtpConfig, SmtpMailer,
};
pub use probe::{HttpProber, ProbeOutcome, ProbeRegistry, Prober, TcpProber};
