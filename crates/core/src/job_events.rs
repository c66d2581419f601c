//! WebSocket message type constants for generation job events.
//!
//! Every frame is a JSON object tagged by its `type` field.

/// Status change or step transition (`step` of `total_steps`).
pub const MSG_TYPE_STATUS_UPDATE: &str = "status_update";

/// Free-text diagnostic narration emitted during a step.
pub const MSG_TYPE_LOG_UPDATE: &str = "log_update";

/// Job completed; carries the generated content.
pub const MSG_TYPE_GENERATION_COMPLETE: &str = "generation_complete";

/// Job failed; carries the classified error info.
pub const MSG_TYPE_GENERATION_ERROR: &str = "generation_error";

/// Sent once right after the socket is upgraded.
pub const MSG_TYPE_CONNECTED: &str = "connected";

/// Acknowledges a `join_task` request.
pub const MSG_TYPE_JOINED_TASK: &str = "joined_task";

/// Acknowledges a `forget_task` request.
pub const MSG_TYPE_FORGOT_TASK: &str = "forgot_task";

/// Request-level failure (unknown job, malformed frame, ...).
pub const MSG_TYPE_ERROR: &str = "error";

// ---------------------------------------------------------------------------
// Client requests
// ---------------------------------------------------------------------------

/// Follow a job: subscribe and receive a reconciliation snapshot.
pub const MSG_TYPE_JOIN_TASK: &str = "join_task";

/// Stop receiving events for a job; the local record is kept.
pub const MSG_TYPE_LEAVE_TASK: &str = "leave_task";

/// Drop the local record of a terminal job.
pub const MSG_TYPE_FORGET_TASK: &str = "forget_task";
