use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{tcp_target, MonitorSpec};

use super::{ProbeOutcome, Prober};

/// Probes a `host:port` target by opening a TCP connection. The connection
/// is dropped immediately; reachability is all we measure.
pub struct TcpProber;

impl TcpProber {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, spec: &MonitorSpec, timeout: Duration) -> ProbeOutcome {
        let (host, port) = match tcp_target(&spec.url) {
            Ok(target) => target,
            Err(reason) => return ProbeOutcome::failed(reason),
        };

        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_stream)) => {
                let latency = started.elapsed();
                debug!(
                    monitor = %spec.name,
                    target = %format!("{host}:{port}"),
                    latency_ms = latency.as_millis() as u64,
                    "probe ok"
                );
                ProbeOutcome::ok(latency)
            }
            Ok(Err(e)) => ProbeOutcome::failed(format!("Connect to {host}:{port} failed: {e}")),
            Err(_) => ProbeOutcome::failed(format!(
                "Connect to {host}:{port} timed out after {}ms",
                timeout.as_millis()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn spec(url: &str) -> MonitorSpec {
        MonitorSpec {
            name: "db".to_string(),
            monitor_type: "TCP".to_string(),
            url: url.to_string(),
            interval_seconds: 30,
            headers: None,
            payload: None,
            notify_emails: None,
        }
    }

    #[tokio::test]
    async fn open_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let outcome = TcpProber::new()
            .probe(&spec(&addr.to_string()), Duration::from_secs(2))
            .await;

        assert!(outcome.success);
        assert!(outcome.latency.is_some());
    }

    #[tokio::test]
    async fn closed_port_is_a_failed_outcome() {
        // Bind then drop to get a port that is very likely closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = TcpProber::new()
            .probe(&spec(&addr.to_string()), Duration::from_secs(2))
            .await;

        assert!(!outcome.success);
        assert!(outcome.error_detail.unwrap().contains("failed"));
    }

    #[tokio::test]
    async fn malformed_target_is_a_failed_outcome() {
        let outcome = TcpProber::new()
            .probe(&spec("no-port-here"), Duration::from_secs(1))
            .await;

        assert!(!outcome.success);
    }
}
