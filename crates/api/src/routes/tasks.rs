//! Route definitions for the `/tasks` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /                -> list_tasks
/// POST   /                -> submit_task
/// GET    /{id}            -> get_task
/// DELETE /{id}            -> delete_task
/// GET    /{id}/logs       -> get_task_logs
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::submit_task))
        .route("/{id}", get(tasks::get_task).delete(tasks::delete_task))
        .route("/{id}/logs", get(tasks::get_task_logs))
}
