//! Handlers for the `/tasks` resource.
//!
//! Submission returns as soon as the job exists; progress is observed over
//! the WebSocket or by polling `GET /tasks/{id}`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use scribeflow_core::job::SubmitJob;
use scribeflow_core::types::JobId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a task id path segment or client-supplied id.
pub fn parse_task_id(raw: &str) -> AppResult<JobId> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid task id '{raw}'")))
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks
///
/// Submit a new generation job. Returns 202 with the task id; the job starts
/// `queued` and its runner is already spawned.
pub async fn submit_task(
    State(state): State<AppState>,
    payload: Result<Json<SubmitJob>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    let submission = state.gateway.submit(input).await?;

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: submission })))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/tasks
///
/// All resident jobs, newest first.
pub async fn list_tasks(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = state.gateway.list().await;
    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = state.gateway.status(parse_task_id(&id)?).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/tasks/{id}/logs
///
/// Retained log lines, oldest first.
pub async fn get_task_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let logs = state.gateway.logs(parse_task_id(&id)?).await?;
    Ok(Json(DataResponse { data: logs }))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/tasks/{id}
///
/// Only completed or failed jobs can be deleted (409 otherwise). Open
/// subscriptions to the job are closed.
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.gateway.delete(parse_task_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
