use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{MonitorSpec, MonitorType};

use super::{ProbeOutcome, Prober};

/// Build the shared HTTP client used by all HTTP/POST monitors.
pub fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(20)
        .gzip(true)
        .build()
        .expect("Failed to build HTTP client")
}

/// Probes a URL with GET, or POST when the monitor carries a payload type.
/// Any 2xx or 3xx response counts as reachable.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new(build_client(Duration::from_secs(10)))
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, spec: &MonitorSpec, timeout: Duration) -> ProbeOutcome {
        let mut request = match spec.parsed_type() {
            Some(MonitorType::Post) => {
                let mut req = self.client.post(spec.url.trim());
                if let Some(payload) = &spec.payload {
                    req = req.body(payload.clone());
                }
                req
            }
            _ => self.client.get(spec.url.trim()),
        };

        if let Some(headers) = &spec.headers {
            for (key, value) in headers {
                request = request.header(key.as_str(), value.as_str());
            }
        }

        let started = Instant::now();
        match request.timeout(timeout).send().await {
            Ok(response) => {
                let latency = started.elapsed();
                let status = response.status();
                if status.is_success() || status.is_redirection() {
                    debug!(
                        monitor = %spec.name,
                        status = %status,
                        latency_ms = latency.as_millis() as u64,
                        "probe ok"
                    );
                    ProbeOutcome::ok(latency)
                } else {
                    ProbeOutcome::failed_with_latency(
                        format!("HTTP status {}", status.as_u16()),
                        latency,
                    )
                }
            }
            Err(e) if e.is_timeout() => ProbeOutcome::failed(format!(
                "Request timed out after {}ms",
                timeout.as_millis()
            )),
            Err(e) => ProbeOutcome::failed(format!("Request failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec(monitor_type: &str, url: &str) -> MonitorSpec {
        MonitorSpec {
            name: "test".to_string(),
            monitor_type: monitor_type.to_string(),
            url: url.to_string(),
            interval_seconds: 30,
            headers: None,
            payload: None,
            notify_emails: None,
        }
    }

    #[tokio::test]
    async fn get_success_yields_ok_outcome_with_latency() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let prober = HttpProber::default();
        let outcome = prober
            .probe(
                &spec("HTTP", &format!("{}/health", server.uri())),
                Duration::from_secs(5),
            )
            .await;

        assert!(outcome.success);
        assert!(outcome.latency.is_some());
        assert!(outcome.error_detail.is_none());
    }

    #[tokio::test]
    async fn server_error_yields_failed_outcome_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let prober = HttpProber::default();
        let outcome = prober
            .probe(&spec("HTTP", &server.uri()), Duration::from_secs(5))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error_detail.as_deref(), Some("HTTP status 503"));
        assert!(outcome.latency.is_some());
    }

    #[tokio::test]
    async fn redirect_counts_as_reachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let prober = HttpProber::new(client);
        let outcome = prober
            .probe(&spec("HTTP", &server.uri()), Duration::from_secs(5))
            .await;

        assert!(outcome.success);
    }

    #[tokio::test]
    async fn post_sends_payload_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-api-key", "secret"))
            .and(body_string(r#"{"ping":true}"#))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut spec = spec("POST", &format!("{}/hook", server.uri()));
        spec.payload = Some(r#"{"ping":true}"#.to_string());
        spec.headers = Some(HashMap::from([(
            "x-api-key".to_string(),
            "secret".to_string(),
        )]));

        let prober = HttpProber::default();
        let outcome = prober.probe(&spec, Duration::from_secs(5)).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn slow_response_times_out_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let prober = HttpProber::default();
        let outcome = prober
            .probe(&spec("HTTP", &server.uri()), Duration::from_millis(100))
            .await;

        assert!(!outcome.success);
        let detail = outcome.error_detail.unwrap();
        assert!(detail.contains("timed out"), "unexpected detail: {detail}");
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_failed_outcome_not_a_panic() {
        let prober = HttpProber::default();
        let outcome = prober
            .probe(
                &spec("HTTP", "http://nonexistent.invalid"),
                Duration::from_secs(2),
            )
            .await;

        assert!(!outcome.success);
        assert!(outcome.error_detail.is_some());
    }
}
