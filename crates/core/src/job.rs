//! Generation job record, status machine, and submission DTO.
//!
//! [`Job::apply`] is the single place where the lifecycle invariants are
//! checked; the registry calls it under the job's entry lock.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::error_info::ErrorInfo;
use crate::types::{JobId, Timestamp};

/// `current_step` text of a freshly created job.
pub const QUEUED_STEP_MESSAGE: &str = "Queued for processing";

/// Upper bound on topic length (characters).
pub const MAX_TOPIC_LEN: u64 = 500;

/// Upper bound on free-form instructions length (characters).
pub const MAX_INSTRUCTIONS_LEN: u64 = 5000;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Job lifecycle status.
///
/// ```text
/// queued -> in_progress -> completed
///                       -> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Completed)
                | (JobStatus::InProgress, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A single generation request and its lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub topic: String,
    pub instructions: Option<String>,
    pub status: JobStatus,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub current_step: String,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub result: Option<String>,
    pub error: Option<ErrorInfo>,
}

impl Job {
    /// Build a queued job from an already validated submission.
    pub fn new(id: JobId, input: SubmitJob) -> Self {
        Self {
            id,
            topic: input.topic,
            instructions: input.instructions,
            status: JobStatus::Queued,
            progress: 0.0,
            current_step: QUEUED_STEP_MESSAGE.to_string(),
            created_at: chrono::Utc::now(),
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Apply a partial update, enforcing the lifecycle invariants.
    ///
    /// On error the record is left untouched.
    pub fn apply(&mut self, update: JobUpdate, now: Timestamp) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "Job {} is {} and can no longer change",
                self.id, self.status
            )));
        }

        let next = update.status.unwrap_or(self.status);
        if next != self.status && !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidState(format!(
                "Job {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        if let Some(progress) = update.progress {
            if !(0.0..=100.0).contains(&progress) {
                return Err(CoreError::Validation(format!(
                    "progress must be within 0..=100, got {progress}"
                )));
            }
            if self.status == JobStatus::InProgress
                && next == JobStatus::InProgress
                && progress < self.progress
            {
                return Err(CoreError::InvalidState(format!(
                    "Job {} progress may not decrease ({} -> {progress})",
                    self.id, self.progress
                )));
            }
        }

        match (next, update.error.is_some()) {
            (JobStatus::Failed, false) => {
                return Err(CoreError::InvalidState(format!(
                    "Job {} cannot fail without error info",
                    self.id
                )));
            }
            (status, true) if status != JobStatus::Failed => {
                return Err(CoreError::InvalidState(format!(
                    "Job {} can only carry error info when failed",
                    self.id
                )));
            }
            _ => {}
        }

        if update.result.is_some() && next != JobStatus::Completed {
            return Err(CoreError::InvalidState(format!(
                "Job {} can only carry a result when completed",
                self.id
            )));
        }

        self.status = next;
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(step) = update.current_step {
            self.current_step = step;
        }
        if update.result.is_some() {
            self.result = update.result;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JobUpdate
// ---------------------------------------------------------------------------

/// Partial set of fields written through the registry's update path.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub current_step: Option<String>,
    pub result: Option<String>,
    pub error: Option<ErrorInfo>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_current_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }
}

// ---------------------------------------------------------------------------
// SubmitJob
// ---------------------------------------------------------------------------

/// DTO for `POST /api/v1/tasks`.
///
/// A missing `topic` deserializes to an empty string so it is reported as a
/// validation error rather than a body parse failure.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SubmitJob {
    #[serde(default)]
    #[validate(length(max = MAX_TOPIC_LEN, message = "Topic is too long"))]
    pub topic: String,
    #[serde(default)]
    #[validate(length(max = MAX_INSTRUCTIONS_LEN, message = "Instructions are too long"))]
    pub instructions: Option<String>,
}

impl SubmitJob {
    pub fn new(topic: impl Into<String>, instructions: Option<String>) -> Self {
        Self {
            topic: topic.into(),
            instructions,
        }
    }

    /// Validate and normalize the submission.
    ///
    /// Trims the topic and drops blank instructions.
    pub fn validated(self) -> Result<Self, CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        let topic = self.topic.trim().to_string();
        if topic.is_empty() {
            return Err(CoreError::Validation("Topic is required".to_string()));
        }

        let instructions = self
            .instructions
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            topic,
            instructions,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
