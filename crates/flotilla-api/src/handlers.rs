//! REST API handlers.
//!
//! Each handler drives the workflow executor or reads through the
//! injected components and returns JSON responses.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use tracing::info;

use flotilla_core::WorkflowKind;
use flotilla_fleet::FleetError;
use flotilla_workflow::ScaleOutcome;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self { success: true, data: Some(data), error: None })
    }

    /// Failure that still carries the data the caller needs for
    /// diagnosis, e.g. the envelope of a failed run.
    fn failed(data: T, msg: &str) -> Json<Self> {
        Json(Self { success: false, data: Some(data), error: Some(msg.to_string()) })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> { success: false, data: None, error: Some(msg.to_string()) }),
    )
}

fn parse_workflow(value: &str) -> Result<WorkflowKind, Response> {
    match value {
        "add" => Ok(WorkflowKind::Add),
        "remove" => Ok(WorkflowKind::Remove),
        other => Err(error_response(
            &format!("unknown workflow {other:?}, expected \"add\" or \"remove\""),
            StatusCode::BAD_REQUEST,
        )
        .into_response()),
    }
}

// ── Scale triggers ─────────────────────────────────────────────

/// Optional trigger body naming who asked.
#[derive(serde::Deserialize)]
pub struct TriggerRequest {
    pub triggered_by: Option<String>,
}

fn triggered_by(body: Option<Json<TriggerRequest>>) -> String {
    body.and_then(|Json(b)| b.triggered_by).unwrap_or_else(|| "api".to_string())
}

fn outcome_response(outcome: ScaleOutcome) -> Response {
    if outcome.disposition.is_failure() {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse::failed(outcome, "scale workflow failed"),
        )
            .into_response()
    } else {
        ApiResponse::ok(outcome).into_response()
    }
}

/// POST /api/v1/scale/out
pub async fn scale_out(
    State(state): State<ApiState>,
    body: Option<Json<TriggerRequest>>,
) -> impl IntoResponse {
    let triggered_by = triggered_by(body);
    info!(triggered_by, "scale-out trigger received");
    let outcome = state.executor.trigger(WorkflowKind::Add, &triggered_by).await;
    outcome_response(outcome)
}

/// POST /api/v1/scale/in
pub async fn scale_in(
    State(state): State<ApiState>,
    body: Option<Json<TriggerRequest>>,
) -> impl IntoResponse {
    let triggered_by = triggered_by(body);
    info!(triggered_by, "scale-in trigger received");
    let outcome = state.executor.trigger(WorkflowKind::Remove, &triggered_by).await;
    outcome_response(outcome)
}

/// POST /api/v1/fleet/drain
pub async fn drain_fleet(
    State(state): State<ApiState>,
    body: Option<Json<TriggerRequest>>,
) -> impl IntoResponse {
    let outcomes = state.executor.drain(&triggered_by(body)).await;
    if outcomes.iter().any(|o| o.disposition.is_failure()) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse::failed(outcomes, "fleet drain stopped on a failed run"),
        )
            .into_response()
    } else {
        ApiResponse::ok(outcomes).into_response()
    }
}

// ── Inspection ─────────────────────────────────────────────────

#[derive(serde::Deserialize)]
pub struct FleetQuery {
    pub filter: Option<String>,
}

/// GET /api/v1/fleet?filter=group|dynamic
pub async fn list_fleet(
    State(state): State<ApiState>,
    Query(query): Query<FleetQuery>,
) -> impl IntoResponse {
    let filter = query.filter.as_deref().unwrap_or("group");
    match state.inventory.list_named(filter).await {
        Ok(members) => ApiResponse::ok(members).into_response(),
        Err(e @ FleetError::InvalidFilter(_)) => {
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e) => {
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

/// GET /api/v1/records
pub async fn list_records(State(state): State<ApiState>) -> impl IntoResponse {
    match state.dns.records().await {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => {
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

/// GET /api/v1/executions
pub async fn list_executions(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.registry.all().await)
}

/// GET /api/v1/status
pub async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    let status = if state.guard.operation_in_progress().await {
        "operation in progress"
    } else {
        "ok"
    };
    ApiResponse::ok(serde_json::json!({ "monitor_status": status }))
}

// ── Suspend switches ───────────────────────────────────────────

#[derive(serde::Deserialize)]
pub struct SuspendRequest {
    pub suspended: bool,
}

#[derive(serde::Serialize)]
pub struct SuspendState {
    pub workflow: WorkflowKind,
    pub suspended: bool,
}

/// GET /api/v1/suspend/{add|remove}
pub async fn get_suspend(
    State(state): State<ApiState>,
    Path(workflow): Path<String>,
) -> impl IntoResponse {
    let kind = match parse_workflow(&workflow) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    match state.suspend.is_suspended(kind).await {
        Ok(suspended) => {
            ApiResponse::ok(SuspendState { workflow: kind, suspended }).into_response()
        }
        Err(e) => {
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

/// PUT /api/v1/suspend/{add|remove}
pub async fn put_suspend(
    State(state): State<ApiState>,
    Path(workflow): Path<String>,
    Json(req): Json<SuspendRequest>,
) -> impl IntoResponse {
    let kind = match parse_workflow(&workflow) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    match state.suspend.set_suspended(kind, req.suspended).await {
        Ok(()) => ApiResponse::ok(SuspendState { workflow: kind, suspended: req.suspended })
            .into_response(),
        Err(e) => {
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}
