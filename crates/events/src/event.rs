//! Events published for a job while its runner drives it.
//!
//! [`JobEvent`] serializes to the exact WebSocket frame shape, tagged by
//! `type` (see `scribeflow_core::job_events`).

use serde::{Deserialize, Serialize};

use scribeflow_core::error_info::ErrorInfo;
use scribeflow_core::job::{Job, JobStatus};
use scribeflow_core::types::{JobId, Timestamp};

/// Message carried by `generation_complete`.
pub const GENERATION_COMPLETE_MESSAGE: &str = "Blog generation completed successfully!";

/// A single progress, log, or terminal event for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    StatusUpdate {
        task_id: JobId,
        status: JobStatus,
        message: String,
        progress: f64,
        /// 1-based step index; `0` for initialization. Absent on
        /// snapshot-derived updates.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_steps: Option<usize>,
    },
    LogUpdate {
        task_id: JobId,
        log: String,
        timestamp: Timestamp,
    },
    GenerationComplete {
        task_id: JobId,
        status: JobStatus,
        message: String,
        content: String,
    },
    GenerationError {
        task_id: JobId,
        status: JobStatus,
        error_info: ErrorInfo,
    },
}

impl JobEvent {
    /// Step transition published by the runner.
    pub fn step(
        task_id: JobId,
        status: JobStatus,
        message: impl Into<String>,
        progress: f64,
        step: usize,
        total_steps: usize,
    ) -> Self {
        JobEvent::StatusUpdate {
            task_id,
            status,
            message: message.into(),
            progress,
            step: Some(step),
            total_steps: Some(total_steps),
        }
    }

    pub fn log(task_id: JobId, log: impl Into<String>, timestamp: Timestamp) -> Self {
        JobEvent::LogUpdate {
            task_id,
            log: log.into(),
            timestamp,
        }
    }

    pub fn complete(task_id: JobId, content: impl Into<String>) -> Self {
        JobEvent::GenerationComplete {
            task_id,
            status: JobStatus::Completed,
            message: GENERATION_COMPLETE_MESSAGE.to_string(),
            content: content.into(),
        }
    }

    pub fn error(task_id: JobId, error_info: ErrorInfo) -> Self {
        JobEvent::GenerationError {
            task_id,
            status: JobStatus::Failed,
            error_info,
        }
    }

    /// Events that bring a late observer up to date with `job`.
    ///
    /// Always a status update built from the snapshot; terminal jobs also
    /// get their terminal event so the observer receives the content or
    /// error info it would otherwise have missed.
    pub fn reconcile(job: &Job) -> Vec<JobEvent> {
        let mut events = vec![JobEvent::StatusUpdate {
            task_id: job.id,
            status: job.status,
            message: job.current_step.clone(),
            progress: job.progress,
            step: None,
            total_steps: None,
        }];

        match (job.status, &job.result, &job.error) {
            (JobStatus::Completed, Some(content), _) => {
                events.push(JobEvent::complete(job.id, content.clone()));
            }
            (JobStatus::Failed, _, Some(info)) => {
                events.push(JobEvent::error(job.id, info.clone()));
            }
            _ => {}
        }

        events
    }

    pub fn task_id(&self) -> JobId {
        match self {
            JobEvent::StatusUpdate { task_id, .. }
            | JobEvent::LogUpdate { task_id, .. }
            | JobEvent::GenerationComplete { task_id, .. }
            | JobEvent::GenerationError { task_id, .. } => *task_id,
        }
    }

    /// Whether this event ends the job's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::GenerationComplete { .. } | JobEvent::GenerationError { .. }
        )
    }
}
