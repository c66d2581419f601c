//! Per-job state machine driver.
//!
//! A [`JobRunner`] walks one job through its [`Pipeline`]:
//!
//! ```text
//! queued -> in_progress (step 0: init, steps 1..=n) -> completed
//!                                                   -> failed
//! ```
//!
//! Every state change is written to the registry first and then published,
//! so a snapshot pulled after any event is at least as new as that event.
//! Each step runs in its own task under `step_timeout`; a step that stalls is
//! aborted and the job fails with a timeout error. No automatic retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};

use scribeflow_core::job::{JobStatus, JobUpdate};
use scribeflow_core::types::JobId;
use scribeflow_events::{Broadcaster, JobEvent};
use scribeflow_registry::JobRegistry;

use crate::generator::{ContentGenerator, GenerationError, LogSink, StepContext};
use crate::steps::Pipeline;

/// `current_step` while the runner sets up (step 0).
pub const INITIALIZING_MESSAGE: &str = "Initializing blog generation workflow...";

/// `current_step` of a failed job.
pub const FAILURE_MESSAGE: &str = "Blog generation failed. Please try again.";

/// Default upper bound on a single step.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(600);

/// Drives jobs through the pipeline. Cheap to clone; one spawned task per job.
#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    broadcaster: Arc<Broadcaster>,
    generator: Arc<dyn ContentGenerator>,
    pipeline: Arc<Pipeline>,
    step_timeout: Duration,
}

impl JobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        broadcaster: Arc<Broadcaster>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            generator,
            pipeline: Arc::new(Pipeline::default_blog()),
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run `job_id` to a terminal state on a new task.
    pub fn spawn(&self, job_id: JobId) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(job_id).await })
    }

    /// Run `job_id` to a terminal state on the current task.
    pub async fn run(&self, job_id: JobId) {
        tracing::info!(job_id = %job_id, steps = self.pipeline.len(), "Job runner started");

        match self.execute(job_id).await {
            Ok(content) => self.complete(job_id, content).await,
            Err(e) => self.fail(job_id, e).await,
        }
    }

    async fn execute(&self, job_id: JobId) -> Result<String, GenerationError> {
        let job = self.registry.get(job_id).await.map_err(internal)?;
        let total = self.pipeline.len();
        let logs = LogSink::new(
            job_id,
            Arc::clone(&self.registry),
            Arc::clone(&self.broadcaster),
        );

        self.registry
            .update(
                job_id,
                JobUpdate::new()
                    .with_status(JobStatus::InProgress)
                    .with_progress(0.0)
                    .with_current_step(INITIALIZING_MESSAGE),
            )
            .await
            .map_err(internal)?;
        self.broadcaster
            .publish(
                job_id,
                JobEvent::step(job_id, JobStatus::InProgress, INITIALIZING_MESSAGE, 0.0, 0, total),
            )
            .await;
        logs.log(format!("Blog generation started for topic: \"{}\"", job.topic))
            .await;

        let mut previous_output = None;
        for step in self.pipeline.plan() {
            let progress = step.progress();
            self.registry
                .update(
                    job_id,
                    JobUpdate::new()
                        .with_progress(progress)
                        .with_current_step(step.message.clone()),
                )
                .await
                .map_err(internal)?;
            self.broadcaster
                .publish(
                    job_id,
                    JobEvent::step(
                        job_id,
                        JobStatus::InProgress,
                        step.message.clone(),
                        progress,
                        step.index,
                        step.total,
                    ),
                )
                .await;
            logs.log(step.log_line()).await;

            tracing::debug!(job_id = %job_id, step = step.index, name = %step.name, "Running step");

            let ctx = StepContext {
                job_id,
                topic: job.topic.clone(),
                instructions: job.instructions.clone(),
                step,
                previous_output: previous_output.take(),
            };
            previous_output = Some(self.run_step(ctx, logs.clone()).await?);
        }

        Ok(previous_output.unwrap_or_default())
    }

    /// Run one step on its own task, bounded by `step_timeout`.
    async fn run_step(&self, ctx: StepContext, logs: LogSink) -> Result<String, GenerationError> {
        let step = ctx.step.name.clone();
        let generator = Arc::clone(&self.generator);
        let mut handle = tokio::spawn(async move { generator.run_step(ctx, logs).await });

        match tokio::time::timeout(self.step_timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(GenerationError::Panicked {
                step,
                message: panic_message(join_err),
            }),
            Err(_) => {
                handle.abort();
                // Wait out the abort so no late log lands after the failure.
                let _ = handle.await;
                Err(GenerationError::Timeout {
                    step,
                    timeout: self.step_timeout,
                })
            }
        }
    }

    async fn complete(&self, job_id: JobId, content: String) {
        let update = JobUpdate::new()
            .with_status(JobStatus::Completed)
            .with_progress(100.0)
            .with_current_step(scribeflow_events::event::GENERATION_COMPLETE_MESSAGE)
            .with_result(content.clone());

        match self.registry.update(job_id, update).await {
            Ok(_) => {
                self.broadcaster
                    .publish(job_id, JobEvent::complete(job_id, content))
                    .await;
                tracing::info!(job_id = %job_id, "Job completed");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to mark job completed");
                self.fail(job_id, internal(e)).await;
            }
        }
    }

    async fn fail(&self, job_id: JobId, error: GenerationError) {
        let info = error.to_error_info();
        tracing::error!(
            job_id = %job_id,
            error_type = %info.error_type,
            error = %error,
            "Job failed",
        );

        let update = JobUpdate::new()
            .with_status(JobStatus::Failed)
            .with_current_step(FAILURE_MESSAGE)
            .with_error(info.clone());

        match self.registry.update(job_id, update).await {
            Ok(_) => {
                self.broadcaster
                    .publish(job_id, JobEvent::error(job_id, info))
                    .await;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to mark job failed");
            }
        }
    }
}

/// Registry errors inside a run are system failures.
fn internal(e: scribeflow_core::error::CoreError) -> GenerationError {
    GenerationError::Classified {
        kind: scribeflow_core::error_info::ErrorKind::System,
        message: e.to_string(),
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "step task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
