use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of reachability check a monitor performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitorType {
    /// Plain HTTP GET against the configured URL.
    Http,
    /// HTTP POST with the configured payload and headers.
    Post,
    /// TCP socket connect against `host:port`.
    Tcp,
}

impl FromStr for MonitorType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HTTP" => Ok(Self::Http),
            "POST" => Ok(Self::Post),
            "TCP" => Ok(Self::Tcp),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MonitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "HTTP"),
            Self::Post => write!(f, "POST"),
            Self::Tcp => write!(f, "TCP"),
        }
    }
}

/// Notification recipients: either a single address (optionally
/// comma-separated) or a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    /// Flatten to trimmed, non-empty addresses.
    pub fn resolve(&self) -> Vec<String> {
        let parts: Vec<&str> = match self {
            Recipients::One(s) => s.split(',').collect(),
            Recipients::Many(v) => v.iter().map(String::as_str).collect(),
        };
        parts
            .into_iter()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect()
    }
}

/// One configured monitoring target.
///
/// The `monitor_type` field stays a raw string so that an unsupported type is
/// reported by the validator with its entry index, not as a deserialization
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: String,
    pub url: String,
    pub interval_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_emails: Option<Recipients>,
}

impl MonitorSpec {
    pub fn parsed_type(&self) -> Option<MonitorType> {
        self.monitor_type.parse().ok()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// A configuration rule violation, carrying the 1-based index of the
/// offending monitor entry. Fatal to that entry, never to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Monitor {index} name must not be empty")]
    EmptyName { index: usize },
    #[error("Monitor {index} ({name}) URL must not be empty")]
    EmptyUrl { index: usize, name: String },
    #[error("Monitor {index} ({name}) has unsupported type '{monitor_type}'")]
    UnsupportedType {
        index: usize,
        name: String,
        monitor_type: String,
    },
    #[error("Monitor {index} ({name}) interval must be greater than 0")]
    InvalidInterval { index: usize, name: String },
    #[error("Monitor {index} ({name}) URL is invalid: {reason}")]
    InvalidUrl {
        index: usize,
        name: String,
        reason: String,
    },
    #[error("Monitor {index} ({name}) notification address '{address}' is not a valid email")]
    InvalidEmail {
        index: usize,
        name: String,
        address: String,
    },
    #[error("SMTP port '{value}' must be an integer")]
    InvalidSmtpPort { value: String },
}

/// Validate a batch of monitor definitions, collecting one error per invalid
/// entry instead of stopping at the first. Pure; no side effects.
pub fn validate_specs(specs: &[MonitorSpec]) -> Result<(), Vec<ConfigError>> {
    let errors: Vec<ConfigError> = specs
        .iter()
        .enumerate()
        .filter_map(|(i, spec)| validate_spec(i + 1, spec).err())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a single entry. Rules are checked in order: name, URL presence,
/// type, interval, URL shape for the type, notification addresses; the first
/// violation wins.
pub fn validate_spec(index: usize, spec: &MonitorSpec) -> Result<(), ConfigError> {
    if spec.name.trim().is_empty() {
        return Err(ConfigError::EmptyName { index });
    }
    let name = spec.name.clone();

    if spec.url.trim().is_empty() {
        return Err(ConfigError::EmptyUrl { index, name });
    }

    let Some(monitor_type) = spec.parsed_type() else {
        return Err(ConfigError::UnsupportedType {
            index,
            name,
            monitor_type: spec.monitor_type.clone(),
        });
    };

    if spec.interval_seconds == 0 {
        return Err(ConfigError::InvalidInterval { index, name });
    }

    match monitor_type {
        MonitorType::Http | MonitorType::Post => {
            let parsed = url::Url::parse(spec.url.trim()).map_err(|e| ConfigError::InvalidUrl {
                index,
                name: name.clone(),
                reason: e.to_string(),
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::InvalidUrl {
                    index,
                    name,
                    reason: format!("scheme must be http or https, got '{}'", parsed.scheme()),
                });
            }
        }
        MonitorType::Tcp => {
            tcp_target(&spec.url).map_err(|reason| ConfigError::InvalidUrl {
                index,
                name: name.clone(),
                reason,
            })?;
        }
    }

    if let Some(recipients) = &spec.notify_emails {
        for address in recipients.resolve() {
            if !is_valid_email(&address) {
                return Err(ConfigError::InvalidEmail {
                    index,
                    name: spec.name.clone(),
                    address,
                });
            }
        }
    }

    Ok(())
}

/// Derive the connect target for a TCP monitor. Accepts a bare `host:port`
/// pair or an http(s) URL, whose port defaults to 80/443.
pub fn tcp_target(raw: &str) -> Result<(String, u16), String> {
    let trimmed = raw.trim();

    // A bare "host:1234" also parses as a URL with scheme "host", so only
    // take the URL path for http(s).
    if let Ok(parsed) = url::Url::parse(trimmed) {
        if matches!(parsed.scheme(), "http" | "https") {
            let host = parsed
                .host_str()
                .ok_or_else(|| "URL has no host".to_string())?;
            let port = parsed
                .port_or_known_default()
                .ok_or_else(|| "URL has no port".to_string())?;
            return Ok((host.to_string(), port));
        }
    }

    match trimmed.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port: u16 = port
                .parse()
                .map_err(|_| format!("invalid port '{port}'"))?;
            Ok((host.to_string(), port))
        }
        _ => Err("TCP target must be host:port or an http(s) URL".to_string()),
    }
}

/// Minimal syntactic email check: one local part, a dotted domain, no
/// whitespace. Deliverability is the SMTP server's problem.
pub fn is_valid_email(address: &str) -> bool {
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Engine-wide tuning knobs, shared across all monitors.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a single probe's duration. Further capped per monitor
    /// to stay strictly below the polling interval.
    pub probe_timeout: Duration,
    /// Emit an OutageContinuing reminder every Nth consecutive failure;
    /// 0 disables reminders.
    pub reminder_every: u32,
    /// Bound on probes running at the same time across all monitors.
    pub max_concurrent_probes: usize,
    /// How long `stop()` waits for in-flight work before aborting tasks.
    pub shutdown_deadline: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            reminder_every: 10,
            max_concurrent_probes: 16,
            shutdown_deadline: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_reminder_every(mut self, every: u32) -> Self {
        self.reminder_every = every;
        self
    }

    pub fn with_max_concurrent_probes(mut self, max: usize) -> Self {
        self.max_concurrent_probes = max.max(1);
        self
    }

    pub fn with_shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.shutdown_deadline = deadline;
        self
    }

    /// Effective timeout for one probe of a monitor with the given interval:
    /// strictly shorter than the interval so a hung probe cannot starve the
    /// next tick.
    pub fn probe_timeout_for(&self, interval: Duration) -> Duration {
        let cap = interval.mul_f64(0.75);
        self.probe_timeout.min(cap).max(Duration::from_millis(50))
    }
}
