//! Runner and gateway behaviour against scripted generators.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio::sync::Notify;

use scribeflow_core::error::CoreError;
use scribeflow_core::error_info::ErrorKind;
use scribeflow_core::job::{JobStatus, SubmitJob};
use scribeflow_events::{Broadcaster, JobEvent, Subscription};
use scribeflow_pipeline::runner::{FAILURE_MESSAGE, INITIALIZING_MESSAGE};
use scribeflow_pipeline::{
    ContentGenerator, GenerationError, JobRunner, LogSink, StepContext, SubmissionGateway,
};
use scribeflow_registry::JobRegistry;

// ---------------------------------------------------------------------------
// Scripted generators
// ---------------------------------------------------------------------------

/// Succeeds on every step with `"<name> output"`.
struct Scripted;

#[async_trait]
impl ContentGenerator for Scripted {
    async fn run_step(&self, ctx: StepContext, logs: LogSink) -> Result<String, GenerationError> {
        logs.log(format!("working on {}", ctx.step.name)).await;
        Ok(format!("{} output", ctx.step.name))
    }
}

/// Fails at the given 1-based step.
struct FailAt {
    step: usize,
    message: &'static str,
}

#[async_trait]
impl ContentGenerator for FailAt {
    async fn run_step(&self, ctx: StepContext, _logs: LogSink) -> Result<String, GenerationError> {
        if ctx.step.index == self.step {
            return Err(GenerationError::failed(self.message));
        }
        Ok(String::new())
    }
}

/// Never finishes the given step.
struct StallAt(usize);

#[async_trait]
impl ContentGenerator for StallAt {
    async fn run_step(&self, ctx: StepContext, _logs: LogSink) -> Result<String, GenerationError> {
        if ctx.step.index == self.0 {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(String::new())
    }
}

struct Panics;

#[async_trait]
impl ContentGenerator for Panics {
    async fn run_step(&self, _ctx: StepContext, _logs: LogSink) -> Result<String, GenerationError> {
        panic!("generator exploded");
    }
}

/// Blocks the first step until released.
struct Gated(Arc<Notify>);

#[async_trait]
impl ContentGenerator for Gated {
    async fn run_step(&self, ctx: StepContext, _logs: LogSink) -> Result<String, GenerationError> {
        if ctx.step.index == 1 {
            self.0.notified().await;
        }
        Ok("done".to_string())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    registry: Arc<JobRegistry>,
    broadcaster: Arc<Broadcaster>,
    runner: JobRunner,
}

fn harness(generator: impl ContentGenerator + 'static) -> Harness {
    let registry = Arc::new(JobRegistry::new());
    let broadcaster = Arc::new(Broadcaster::new());
    let runner = JobRunner::new(
        Arc::clone(&registry),
        Arc::clone(&broadcaster),
        Arc::new(generator),
    );
    Harness {
        registry,
        broadcaster,
        runner,
    }
}

/// Collect events until the terminal one arrives.
async fn drain(sub: &mut Subscription) -> Vec<JobEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for job events")
            .expect("subscription ended before a terminal event");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

fn status_progress(events: &[JobEvent]) -> Vec<(Option<usize>, f64)> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::StatusUpdate { step, progress, .. } => Some((*step, *progress)),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Test: successful run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_run_reports_every_step_then_completes() {
    let h = harness(Scripted);
    let job = h.registry.create(SubmitJob::new("Rust async", None)).await;
    let mut sub = h.broadcaster.subscribe(uuid::Uuid::new_v4(), job.id).await.unwrap();

    h.runner.spawn(job.id).await.unwrap();
    let events = drain(&mut sub).await;

    assert_eq!(
        status_progress(&events),
        vec![
            (Some(0), 0.0),
            (Some(1), 0.0),
            (Some(2), 25.0),
            (Some(3), 50.0),
            (Some(4), 75.0),
        ]
    );
    assert_matches!(
        &events[0],
        JobEvent::StatusUpdate { message, total_steps: Some(4), .. } if message == INITIALIZING_MESSAGE
    );
    assert_eq!(
        events.last(),
        Some(&JobEvent::complete(job.id, "finalize output"))
    );

    let done = h.registry.get(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100.0);
    assert_eq!(done.result.as_deref(), Some("finalize output"));
    assert!(done.completed_at.is_some());
    assert!(done.error.is_none());
}

#[tokio::test]
async fn logs_are_published_in_emission_order_and_retained() {
    let h = harness(Scripted);
    let job = h.registry.create(SubmitJob::new("Rust", None)).await;
    let mut sub = h.broadcaster.subscribe(uuid::Uuid::new_v4(), job.id).await.unwrap();

    h.runner.run(job.id).await;
    let events = drain(&mut sub).await;

    let published: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::LogUpdate { log, .. } => Some(log.clone()),
            _ => None,
        })
        .collect();
    assert!(published[0].starts_with("Blog generation started for topic"));
    assert_eq!(
        published[1],
        "Step 1/4: Conducting deep research on the topic..."
    );
    assert_eq!(published[2], "working on research");

    let retained: Vec<String> = h
        .registry
        .logs(job.id)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.text)
        .collect();
    assert_eq!(retained, published);
}

// ---------------------------------------------------------------------------
// Test: failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_keeps_progress_of_failing_step() {
    let h = harness(FailAt {
        step: 3,
        message: "429 Too Many Requests",
    });
    let job = h.registry.create(SubmitJob::new("Rust", None)).await;
    let mut sub = h.broadcaster.subscribe(uuid::Uuid::new_v4(), job.id).await.unwrap();

    h.runner.run(job.id).await;
    let events = drain(&mut sub).await;

    assert!(!events
        .iter()
        .any(|e| matches!(e, JobEvent::GenerationComplete { .. })));
    let info = match events.last() {
        Some(JobEvent::GenerationError { error_info, .. }) => error_info.clone(),
        other => panic!("expected generation_error, got {other:?}"),
    };
    assert_eq!(info.error_type, ErrorKind::RateLimit);
    assert!(!info.user_message.is_empty());
    assert!(!info.suggestions.is_empty());

    let failed = h.registry.get(job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.progress, 50.0);
    assert_eq!(failed.current_step, FAILURE_MESSAGE);
    assert!(failed.completed_at.is_some());
    assert!(failed.result.is_none());
    assert_eq!(failed.error, Some(info));
}

#[tokio::test]
async fn stalled_step_fails_with_timeout() {
    let h = harness(StallAt(2));
    let runner = h.runner.clone().with_step_timeout(Duration::from_millis(50));
    let job = h.registry.create(SubmitJob::new("Rust", None)).await;

    runner.run(job.id).await;

    let failed = h.registry.get(job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.progress, 25.0);
    let info = failed.error.unwrap();
    assert_eq!(info.error_type, ErrorKind::Timeout);
    assert!(info.is_recoverable);
}

#[tokio::test]
async fn panicking_step_fails_as_system_error() {
    let h = harness(Panics);
    let job = h.registry.create(SubmitJob::new("Rust", None)).await;

    h.runner.run(job.id).await;

    let failed = h.registry.get(job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    let info = failed.error.unwrap();
    assert_eq!(info.error_type, ErrorKind::System);
    assert!(info.technical_details.contains("generator exploded"));
}

#[tokio::test]
async fn concurrent_jobs_do_not_interfere() {
    let h = harness(Scripted);
    let mut jobs = Vec::new();
    for i in 0..8 {
        let job = h.registry.create(SubmitJob::new(format!("topic {i}"), None)).await;
        let sub = h.broadcaster.subscribe(uuid::Uuid::new_v4(), job.id).await.unwrap();
        jobs.push((job.id, sub, h.runner.spawn(job.id)));
    }

    for (id, mut sub, handle) in jobs {
        handle.await.unwrap();
        let events = drain(&mut sub).await;
        assert!(events.iter().all(|e| e.task_id() == id));
        assert_eq!(
            h.registry.get(id).await.unwrap().status,
            JobStatus::Completed
        );
    }
}

// ---------------------------------------------------------------------------
// Test: gateway
// ---------------------------------------------------------------------------

fn gateway(h: &Harness) -> SubmissionGateway {
    SubmissionGateway::new(
        Arc::clone(&h.registry),
        Arc::clone(&h.broadcaster),
        h.runner.clone(),
    )
}

#[tokio::test]
async fn invalid_submission_creates_no_job() {
    let h = harness(Scripted);
    let gw = gateway(&h);

    assert_matches!(
        gw.submit(SubmitJob::new("  ", None)).await,
        Err(CoreError::Validation(_))
    );
    assert!(h.registry.is_empty().await);
}

#[tokio::test]
async fn submit_returns_before_pipeline_work() {
    let gate = Arc::new(Notify::new());
    let h = harness(Gated(Arc::clone(&gate)));
    let gw = gateway(&h);

    let submission = gw.submit(SubmitJob::new("Rust", None)).await.unwrap();
    assert_eq!(submission.status, JobStatus::Queued);

    let job = gw.status(submission.task_id).await.unwrap();
    assert!(!job.status.is_terminal());

    // Running jobs cannot be deleted.
    assert_matches!(
        gw.delete(submission.task_id).await,
        Err(CoreError::InvalidState(_))
    );

    gate.notify_one();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !gw.status(submission.task_id).await.unwrap().status.is_terminal() {
        assert!(tokio::time::Instant::now() < deadline, "job never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        gw.status(submission.task_id).await.unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn delete_closes_subscriptions_and_forgets_job() {
    let h = harness(Scripted);
    let gw = gateway(&h);
    let job = h.registry.create(SubmitJob::new("Rust", None)).await;
    h.runner.run(job.id).await;

    let observer = uuid::Uuid::new_v4();
    let (snapshot, sub) = gw.observe(observer, job.id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed);
    let mut sub = sub.unwrap();

    gw.delete(job.id).await.unwrap();
    assert!(sub.recv().await.is_none());
    assert_matches!(gw.status(job.id).await, Err(CoreError::NotFound { .. }));
    assert_matches!(gw.delete(job.id).await, Err(CoreError::NotFound { .. }));
}

#[tokio::test]
async fn observe_unknown_job_is_not_found() {
    let h = harness(Scripted);
    let gw = gateway(&h);
    let id = uuid::Uuid::new_v4();

    assert_matches!(
        gw.observe(uuid::Uuid::new_v4(), id).await,
        Err(CoreError::NotFound { .. })
    );
    assert_eq!(h.broadcaster.subscriber_count(id).await, 0);
}

#[tokio::test]
async fn repeat_observe_keeps_single_subscription() {
    let h = harness(Scripted);
    let gw = gateway(&h);
    let job = h.registry.create(SubmitJob::new("Rust", None)).await;
    let observer = uuid::Uuid::new_v4();

    let (_, first) = gw.observe(observer, job.id).await.unwrap();
    let (_, second) = gw.observe(observer, job.id).await.unwrap();
    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(h.broadcaster.subscriber_count(job.id).await, 1);
}
