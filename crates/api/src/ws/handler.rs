use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use scribeflow_events::ObserverSession;

use crate::error::AppError;
use crate::handlers::tasks::parse_task_id;
use crate::state::AppState;
use crate::ws::protocol::{self, ClientMessage};

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with `WsManager` and
/// gets its own observer session.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Multiplexes inbound requests and job events on the current task.
///   4. Releases subscriptions and cleans up on disconnect.
///
/// Disconnecting never affects the jobs being observed.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let observer_id = uuid::Uuid::new_v4();
    let conn_id = observer_id.to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    // Register and get the receiver for outbound messages.
    let mut rx = state.ws_manager.add(conn_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut session = ObserverSession::new(
        observer_id,
        state.broadcaster.clone(),
        state.config.log_retention,
    );
    let mut open = send_frame(&state, &conn_id, &protocol::connected()).await;

    while open {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    open = handle_client_message(&state, &mut session, &conn_id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
            Some(event) = session.next_event(), if session.has_subscriptions() => {
                open = send_frame(&state, &conn_id, &event).await;
            }
        }
    }

    // Clean up: release subscriptions, remove connection, stop the sender.
    session.close().await;
    state.ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Handle one inbound text frame. Returns `false` once the connection can no
/// longer be written to.
async fn handle_client_message(
    state: &AppState,
    session: &mut ObserverSession,
    conn_id: &str,
    text: &str,
) -> bool {
    let request = match ClientMessage::parse(text) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(conn_id = %conn_id, error = %e, "Malformed WebSocket frame");
            let frame = protocol::error("BAD_REQUEST", format!("Malformed message: {e}"));
            return send_frame(state, conn_id, &frame).await;
        }
    };

    match request {
        ClientMessage::JoinTask { task_id } => {
            let result = async {
                let id = parse_task_id(&task_id)?;
                let (snapshot, subscription) =
                    state.gateway.observe(session.observer_id(), id).await?;
                Ok::<_, AppError>((id, session.follow(&snapshot, subscription)))
            }
            .await;

            match result {
                Ok((id, reconciliation)) => {
                    tracing::debug!(conn_id = %conn_id, job_id = %id, "Joined task");
                    if !send_frame(state, conn_id, &protocol::joined_task(id)).await {
                        return false;
                    }
                    for event in &reconciliation {
                        if !send_frame(state, conn_id, event).await {
                            return false;
                        }
                    }
                    true
                }
                Err(e) => send_error(state, conn_id, e).await,
            }
        }

        ClientMessage::LeaveTask { task_id } => match parse_task_id(&task_id) {
            Ok(id) => {
                session.leave(id).await;
                tracing::debug!(conn_id = %conn_id, job_id = %id, "Left task");
                true
            }
            Err(e) => send_error(state, conn_id, e).await,
        },

        ClientMessage::ForgetTask { task_id } => {
            let result = match parse_task_id(&task_id) {
                Ok(id) => session.forget(id).await.map_err(AppError::from),
                Err(e) => Err(e),
            };
            match result {
                Ok(record) => send_frame(state, conn_id, &protocol::forgot_task(record.id)).await,
                Err(e) => send_error(state, conn_id, e).await,
            }
        }
    }
}

async fn send_error(state: &AppState, conn_id: &str, err: AppError) -> bool {
    let (_, code, message) = err.parts();
    send_frame(state, conn_id, &protocol::error(code, message)).await
}

/// Serialize and queue a frame for this connection.
async fn send_frame<T: serde::Serialize>(state: &AppState, conn_id: &str, frame: &T) -> bool {
    match protocol::text_frame(frame) {
        Ok(message) => state.ws_manager.send(conn_id, message).await,
        Err(e) => {
            tracing::error!(conn_id = %conn_id, error = %e, "Failed to serialize WebSocket frame");
            true
        }
    }
}
