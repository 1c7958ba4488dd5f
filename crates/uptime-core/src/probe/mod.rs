mod http;
mod tcp;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{MonitorSpec, MonitorType};

pub use http::{build_client, HttpProber};
pub use tcp::TcpProber;

/// Result of a single reachability check.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub latency: Option<Duration>,
    pub error_detail: Option<String>,
}

impl ProbeOutcome {
    pub fn ok(latency: Duration) -> Self {
        Self {
            success: true,
            timestamp: Utc::now(),
            latency: Some(latency),
            error_detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: Utc::now(),
            latency: None,
            error_detail: Some(detail.into()),
        }
    }

    pub fn failed_with_latency(detail: impl Into<String>, latency: Duration) -> Self {
        Self {
            success: false,
            timestamp: Utc::now(),
            latency: Some(latency),
            error_detail: Some(detail.into()),
        }
    }
}

/// A reachability check for one monitor type.
///
/// Implementations report every failure mode, including timeouts and
/// connection refusals, as a failed `ProbeOutcome`. They do not return
/// errors and must not panic on network conditions.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, spec: &MonitorSpec, timeout: Duration) -> ProbeOutcome;
}

/// Maps each monitor type to the prober that serves it.
pub struct ProbeRegistry {
    probers: HashMap<MonitorType, Arc<dyn Prober>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self {
            probers: HashMap::new(),
        }
    }

    /// Registry with the built-in probers: HTTP and POST share one
    /// `HttpProber`, TCP gets a `TcpProber`.
    pub fn with_defaults(client: reqwest::Client) -> Self {
        let http: Arc<dyn Prober> = Arc::new(HttpProber::new(client));
        let mut registry = Self::new();
        registry.register(MonitorType::Http, Arc::clone(&http));
        registry.register(MonitorType::Post, http);
        registry.register(MonitorType::Tcp, Arc::new(TcpProber::new()));
        registry
    }

    pub fn register(&mut self, monitor_type: MonitorType, prober: Arc<dyn Prober>) {
        self.probers.insert(monitor_type, prober);
    }

    pub fn get(&self, monitor_type: MonitorType) -> Option<Arc<dyn Prober>> {
        self.probers.get(&monitor_type).map(Arc::clone)
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::with_defaults(build_client(Duration::from_secs(10)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_all_builtin_types() {
        let registry = ProbeRegistry::default();
        assert!(registry.get(MonitorType::Http).is_some());
        assert!(registry.get(MonitorType::Post).is_some());
        assert!(registry.get(MonitorType::Tcp).is_some());
    }

    #[test]
    fn empty_registry_has_no_probers() {
        let registry = ProbeRegistry::new();
        assert!(registry.get(MonitorType::Http).is_none());
    }
}
