pub mod event;
pub mod machine;
pub mod scheduler;

pub use event::{notification_channel, EventKind, Notification, TransitionEvent};
pub use machine::{HealthStatus, MonitorState, StateMachine};
pub use scheduler::{MonitorStatus, ScheduleError, Scheduler};
