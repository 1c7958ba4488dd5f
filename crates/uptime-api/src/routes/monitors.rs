use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use uptime_core::{validate_specs, MonitorSpec, MonitorStatus};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateMonitorsRequest {
    pub monitors: Vec<MonitorSpec>,
}

#[derive(Serialize)]
pub struct CreateMonitorsResponse {
    pub registered: Vec<String>,
}

#[derive(Serialize)]
pub struct MonitorSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: String,
    pub url: String,
    pub interval_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MonitorStatus>,
}

#[derive(Serialize)]
pub struct MonitorsResponse {
    pub monitors: Vec<MonitorSummary>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub monitors: Vec<MonitorStatus>,
}

#[derive(Serialize)]
pub struct DeleteMonitorResponse {
    pub message: String,
    pub name: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/monitors", get(list_monitors).post(create_monitors))
        .route("/monitors/{name}", get(get_monitor).delete(delete_monitor))
        .route("/status", get(get_status))
}

fn summary(state: &AppState, spec: MonitorSpec) -> MonitorSummary {
    let status = state.scheduler.status(&spec.name);
    MonitorSummary {
        name: spec.name,
        monitor_type: spec.monitor_type,
        url: spec.url,
        interval_seconds: spec.interval_seconds,
        status,
    }
}

/// POST /api/v1/monitors
async fn create_monitors(
    State(state): State<AppState>,
    Json(body): Json<CreateMonitorsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.monitors.is_empty() {
        return Err(ApiError::BadRequest(
            "monitors array must not be empty".into(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for spec in &body.monitors {
        if !seen.insert(spec.name.as_str()) {
            return Err(ApiError::Conflict(format!(
                "Duplicate monitor name '{}' in request",
                spec.name
            )));
        }
    }

    validate_specs(&body.monitors)
        .map_err(|errors| {
            ApiError::ValidationFailed(errors.iter().map(ToString::to_string).collect())
        })?;

    let mut registered = Vec::with_capacity(body.monitors.len());
    for spec in body.monitors {
        let name = spec.name.clone();
        state
            .scheduler
            .register(spec)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        registered.push(name);
    }

    Ok((
        StatusCode::CREATED,
        Json(CreateMonitorsResponse { registered }),
    ))
}

/// GET /api/v1/monitors
async fn list_monitors(State(state): State<AppState>) -> impl IntoResponse {
    let monitors: Vec<MonitorSummary> = state
        .scheduler
        .specs()
        .into_iter()
        .map(|spec| summary(&state, spec))
        .collect();
    Json(MonitorsResponse { monitors })
}

/// GET /api/v1/monitors/{name}
async fn get_monitor(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let spec = state
        .scheduler
        .spec(&name)
        .ok_or_else(|| ApiError::NotFound(format!("Monitor '{name}' not found")))?;
    Ok(Json(summary(&state, spec)))
}

/// DELETE /api/v1/monitors/{name}
async fn delete_monitor(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.scheduler.unregister(&name) {
        return Err(ApiError::NotFound(format!("Monitor '{name}' not found")));
    }
    Ok(Json(DeleteMonitorResponse {
        message: "Monitor deleted".into(),
        name,
    }))
}

/// GET /api/v1/status
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        monitors: state.scheduler.statuses(),
    })
}
