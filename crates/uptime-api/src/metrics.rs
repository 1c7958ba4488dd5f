use std::fmt::Write;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::state::AppState;

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut out = String::with_capacity(2048);

    let statuses = state.scheduler.statuses();

    writeln!(out, "# TYPE uptime_monitors gauge").unwrap();
    writeln!(out, "# HELP uptime_monitors Number of registered monitors").unwrap();
    writeln!(out, "uptime_monitors {}", statuses.len()).unwrap();

    writeln!(out, "# TYPE uptime_monitor_status stateset").unwrap();
    writeln!(out, "# HELP uptime_monitor_status Current health of the monitor").unwrap();
    for s in &statuses {
        let current = s.status.to_string();
        for variant in &["healthy", "outage", "ongoing_outage"] {
            writeln!(
                out,
                "uptime_monitor_status{{monitor=\"{}\",status=\"{}\"}} {}",
                s.monitor_name,
                variant,
                if current == *variant { 1 } else { 0 }
            )
            .unwrap();
        }
    }

    writeln!(out, "# TYPE uptime_monitor_consecutive_failures gauge").unwrap();
    writeln!(
        out,
        "# HELP uptime_monitor_consecutive_failures Consecutive failed probes"
    )
    .unwrap();
    for s in &statuses {
        writeln!(
            out,
            "uptime_monitor_consecutive_failures{{monitor=\"{}\"}} {}",
            s.monitor_name, s.consecutive_failures
        )
        .unwrap();
    }

    writeln!(out, "# TYPE uptime_monitor_latency_milliseconds gauge").unwrap();
    writeln!(
        out,
        "# HELP uptime_monitor_latency_milliseconds Latency of the last probe"
    )
    .unwrap();
    for s in &statuses {
        if let Some(latency) = s.latency_ms {
            writeln!(
                out,
                "uptime_monitor_latency_milliseconds{{monitor=\"{}\"}} {}",
                s.monitor_name, latency
            )
            .unwrap();
        }
    }

    writeln!(out, "# TYPE uptime_monitor_last_check_timestamp_seconds gauge").unwrap();
    writeln!(
        out,
        "# HELP uptime_monitor_last_check_timestamp_seconds Unix timestamp of the last probe"
    )
    .unwrap();
    for s in &statuses {
        if let Some(t) = s.last_checked {
            let secs = t.timestamp() as f64 + (t.timestamp_subsec_millis() as f64 / 1000.0);
            writeln!(
                out,
                "uptime_monitor_last_check_timestamp_seconds{{monitor=\"{}\"}} {:.3}",
                s.monitor_name, secs
            )
            .unwrap();
        }
    }

    writeln!(out, "# EOF").unwrap();

    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        out,
    )
}
