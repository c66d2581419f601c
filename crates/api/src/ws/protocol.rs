//! WebSocket frame shapes.
//!
//! Inbound frames are parsed into [`ClientMessage`]. Outbound control frames
//! are built here; job events are serialized straight from
//! [`JobEvent`](scribeflow_events::JobEvent).

use axum::extract::ws::Message;
use serde::Deserialize;
use serde_json::json;

use scribeflow_core::job_events::{
    MSG_TYPE_CONNECTED, MSG_TYPE_ERROR, MSG_TYPE_FORGOT_TASK, MSG_TYPE_JOINED_TASK,
};
use scribeflow_core::types::JobId;

/// Requests a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinTask { task_id: String },
    LeaveTask { task_id: String },
    ForgetTask { task_id: String },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

pub fn connected() -> serde_json::Value {
    json!({
        "type": MSG_TYPE_CONNECTED,
        "message": "Connected to blog generation service",
    })
}

pub fn joined_task(task_id: JobId) -> serde_json::Value {
    json!({
        "type": MSG_TYPE_JOINED_TASK,
        "task_id": task_id,
        "message": format!("Joined task {task_id}"),
    })
}

pub fn forgot_task(task_id: JobId) -> serde_json::Value {
    json!({
        "type": MSG_TYPE_FORGOT_TASK,
        "task_id": task_id,
    })
}

pub fn error(code: &str, message: impl Into<String>) -> serde_json::Value {
    json!({
        "type": MSG_TYPE_ERROR,
        "code": code,
        "message": message.into(),
    })
}

/// Wrap any serializable frame as a text message.
pub fn text_frame<T: serde::Serialize>(frame: &T) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(serde_json::to_string(frame)?.into()))
}
