//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! log_format = "json"
//!
//! [defaults]
//! probe_timeout_secs = 10
//! reminder_every = 10
//! notify_on = ["outage_started", "recovered"]
//!
//! [smtp]
//! host = "smtp.example.com"
//! port = 587
//! username = "alerts"
//! password = "secret"
//! from = "Alerts <alerts@example.com>"
//! starttls = true
//!
//! [[monitor]]
//! name = "api"
//! type = "HTTP"
//! url = "https://api.example.com/health"
//! interval_seconds = 30
//! notify_emails = ["ops@example.com"]
//!
//! [[monitor]]
//! name = "db"
//! type = "TCP"
//! url = "db.example.com:5432"
//! interval_seconds = 60
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use uptime_core::{validate_specs, ConfigError, EngineConfig, EventKind, MonitorSpec, SmtpConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub smtp: Option<SmtpSection>,

    #[serde(default)]
    pub monitor: Vec<MonitorSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_format: default_log_format(),
        }
    }
}

fn default_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_reminder_every")]
    pub reminder_every: u32,

    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    #[serde(default = "default_shutdown_deadline_secs")]
    pub shutdown_deadline_secs: u64,

    #[serde(default = "default_notify_on")]
    pub notify_on: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
            reminder_every: default_reminder_every(),
            max_concurrent_probes: default_max_concurrent_probes(),
            shutdown_deadline_secs: default_shutdown_deadline_secs(),
            notify_on: default_notify_on(),
        }
    }
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_reminder_every() -> u32 {
    10
}

fn default_max_concurrent_probes() -> usize {
    16
}

fn default_shutdown_deadline_secs() -> u64 {
    5
}

fn default_notify_on() -> Vec<String> {
    vec!["outage_started".into(), "recovered".into()]
}

impl DefaultsConfig {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_probe_timeout(Duration::from_secs(self.probe_timeout_secs))
            .with_reminder_every(self.reminder_every)
            .with_max_concurrent_probes(self.max_concurrent_probes)
            .with_shutdown_deadline(Duration::from_secs(self.shutdown_deadline_secs))
    }

    pub fn notify_on_kinds(&self) -> Result<Vec<EventKind>, String> {
        self.notify_on
            .iter()
            .map(|s| {
                s.parse()
                    .map_err(|_| format!("Invalid notify_on event kind '{s}'"))
            })
            .collect()
    }
}

/// SMTP port as written in the file: TOML integer or quoted string. A string
/// that does not parse as an integer is rejected during validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u16),
    Text(String),
}

impl PortValue {
    pub fn parse(&self) -> Result<u16, ConfigError> {
        match self {
            PortValue::Number(n) => Ok(*n),
            PortValue::Text(s) => {
                s.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidSmtpPort { value: s.clone() })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSection {
    pub host: String,
    pub port: PortValue,
    pub username: String,
    pub password: String,
    pub from: String,
    #[serde(default = "default_starttls")]
    pub starttls: bool,
}

fn default_starttls() -> bool {
    true
}

impl SmtpSection {
    pub fn to_smtp_config(&self) -> Result<SmtpConfig, ConfigError> {
        Ok(SmtpConfig {
            host: self.host.clone(),
            port: self.port.parse()?,
            username: self.username.clone(),
            password: self.password.clone(),
            from_addr: self.from.clone(),
            starttls: self.starttls,
        })
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        self.defaults.notify_on_kinds()?;

        if let Some(smtp) = &self.smtp {
            smtp.port.parse().map_err(|e| e.to_string())?;
            if smtp.host.is_empty() {
                return Err("SMTP host must not be empty".into());
            }
        }

        let mut names = std::collections::HashSet::new();
        for m in &self.monitor {
            if !names.insert(&m.name) {
                return Err(format!("Duplicate monitor name: {}", m.name));
            }
        }

        validate_specs(&self.monitor).map_err(|errors| {
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        })?;

        Ok(())
    }
}
