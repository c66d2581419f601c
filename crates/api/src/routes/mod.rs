pub mod health;
pub mod tasks;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                              WebSocket
///
/// /tasks                                           list, submit
/// /tasks/{id}                                      get, delete (terminal only)
/// /tasks/{id}/logs                                 retained log lines
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket endpoint (job progress streaming).
        .route("/ws", get(ws::ws_handler))
        // Generation jobs.
        .nest("/tasks", tasks::router())
}
