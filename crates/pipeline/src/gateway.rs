//! Entry point for submissions and job queries.
//!
//! [`SubmissionGateway::submit`] validates the input, creates the job and
//! spawns its runner, then returns without awaiting any pipeline work.

use std::sync::Arc;

use serde::Serialize;

use scribeflow_core::error::CoreError;
use scribeflow_core::job::{Job, JobStatus, SubmitJob};
use scribeflow_core::types::{JobId, ObserverId};
use scribeflow_events::{Broadcaster, Subscription};
use scribeflow_registry::{JobRegistry, LogEntry};

use crate::runner::JobRunner;

/// Message returned with every accepted submission.
pub const SUBMITTED_MESSAGE: &str =
    "Blog generation started. Connect to WebSocket for real-time updates.";

/// Acknowledgement for an accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub task_id: JobId,
    pub status: JobStatus,
    pub message: String,
}

pub struct SubmissionGateway {
    registry: Arc<JobRegistry>,
    broadcaster: Arc<Broadcaster>,
    runner: JobRunner,
}

impl SubmissionGateway {
    pub fn new(registry: Arc<JobRegistry>, broadcaster: Arc<Broadcaster>, runner: JobRunner) -> Self {
        Self {
            registry,
            broadcaster,
            runner,
        }
    }

    /// Accept a submission and start its runner.
    ///
    /// Invalid input is rejected with [`CoreError::Validation`] and no job is
    /// created.
    pub async fn submit(&self, input: SubmitJob) -> Result<Submission, CoreError> {
        let input = input.validated()?;
        let job = self.registry.create(input).await;
        self.runner.spawn(job.id);

        tracing::info!(job_id = %job.id, topic = %job.topic, "Job submitted");

        Ok(Submission {
            task_id: job.id,
            status: job.status,
            message: SUBMITTED_MESSAGE.to_string(),
        })
    }

    pub async fn status(&self, id: JobId) -> Result<Job, CoreError> {
        self.registry.get(id).await
    }

    pub async fn list(&self) -> Vec<Job> {
        self.registry.list().await
    }

    pub async fn logs(&self, id: JobId) -> Result<Vec<LogEntry>, CoreError> {
        self.registry.logs(id).await
    }

    /// Delete a terminal job and end every open subscription to it.
    pub async fn delete(&self, id: JobId) -> Result<Job, CoreError> {
        let job = self.registry.delete(id).await?;
        self.broadcaster.close_job(id).await;
        tracing::info!(job_id = %id, "Job deleted");
        Ok(job)
    }

    /// Subscribe `observer` to a job and pull a snapshot taken after the
    /// subscription exists, so no event falls between the two.
    ///
    /// The subscription is `None` when the observer was already subscribed.
    pub async fn observe(
        &self,
        observer: ObserverId,
        id: JobId,
    ) -> Result<(Job, Option<Subscription>), CoreError> {
        self.registry.get(id).await?;
        let subscription = self.broadcaster.subscribe(observer, id).await;

        match self.registry.get(id).await {
            Ok(job) => Ok((job, subscription)),
            Err(e) => {
                // Deleted in between.
                self.broadcaster.unsubscribe(observer, id).await;
                Err(e)
            }
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }
}
