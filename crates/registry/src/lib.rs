//! In-memory job registry.
//!
//! [`JobRegistry`] is the sole source of truth for job state. Each job lives
//! behind its own lock, so a runner's write to one job never waits on reads
//! or writes of another; the outer map lock is only held to look up, insert,
//! or remove entries.
//!
//! Designed to be shared via `Arc<JobRegistry>` across the gateway, the
//! runners, and the HTTP/WebSocket layer.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use scribeflow_core::error::CoreError;
use scribeflow_core::job::{Job, JobUpdate, SubmitJob};
use scribeflow_core::types::{JobId, Timestamp};

/// Default number of log lines kept per job.
pub const DEFAULT_LOG_RETENTION: usize = 500;

/// One retained line of runner narration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub text: String,
    pub timestamp: Timestamp,
}

/// Registry-side state for one job.
struct JobEntry {
    job: Job,
    /// Oldest first; capped at the registry's retention.
    logs: VecDeque<LogEntry>,
}

/// Concurrency-safe store of job records keyed by id.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<RwLock<JobEntry>>>>,
    log_retention: usize,
}

impl JobRegistry {
    /// Create an empty registry with the default log retention.
    pub fn new() -> Self {
        Self::with_log_retention(DEFAULT_LOG_RETENTION)
    }

    /// Create an empty registry keeping at most `log_retention` log lines
    /// per job (minimum 1).
    pub fn with_log_retention(log_retention: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            log_retention: log_retention.max(1),
        }
    }

    /// Insert a new queued job and return its snapshot.
    ///
    /// `input` is expected to be validated by the caller.
    pub async fn create(&self, input: SubmitJob) -> Job {
        let mut jobs = self.jobs.write().await;

        let mut id = uuid::Uuid::new_v4();
        while jobs.contains_key(&id) {
            id = uuid::Uuid::new_v4();
        }

        let job = Job::new(id, input);
        let entry = JobEntry {
            job: job.clone(),
            logs: VecDeque::new(),
        };
        jobs.insert(id, Arc::new(RwLock::new(entry)));

        tracing::debug!(job_id = %id, topic = %job.topic, "Job created");
        job
    }

    /// Point-in-time snapshot of a job.
    pub async fn get(&self, id: JobId) -> Result<Job, CoreError> {
        let entry = self.entry(id).await?;
        let guard = entry.read().await;
        Ok(guard.job.clone())
    }

    /// Apply a partial update to a job. The only mutation path.
    ///
    /// Returns the post-update snapshot. Invariant violations (illegal
    /// transition, decreasing progress, writes to a terminal job) are
    /// rejected with [`CoreError::InvalidState`] and leave the job untouched.
    pub async fn update(&self, id: JobId, update: JobUpdate) -> Result<Job, CoreError> {
        let entry = self.entry(id).await?;
        let mut guard = entry.write().await;
        guard.job.apply(update, chrono::Utc::now())?;
        Ok(guard.job.clone())
    }

    /// Remove a terminal job and its logs.
    ///
    /// Non-terminal jobs are rejected with [`CoreError::InvalidState`].
    pub async fn delete(&self, id: JobId) -> Result<Job, CoreError> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(id))?;

        let job = entry.read().await.job.clone();
        if !job.status.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "Job {id} is {} and cannot be deleted until it completes or fails",
                job.status
            )));
        }

        jobs.remove(&id);
        tracing::debug!(job_id = %id, "Job deleted");
        Ok(job)
    }

    /// Snapshots of every resident job, newest first.
    pub async fn list(&self) -> Vec<Job> {
        let entries: Vec<_> = self.jobs.read().await.values().cloned().collect();

        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            jobs.push(entry.read().await.job.clone());
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Number of resident jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of jobs not yet in a terminal state.
    pub async fn active_count(&self) -> usize {
        self.list()
            .await
            .iter()
            .filter(|job| !job.status.is_terminal())
            .count()
    }

    /// Append a log line to a job, evicting the oldest line once the
    /// retention bound is reached.
    pub async fn append_log(&self, id: JobId, text: impl Into<String>) -> Result<LogEntry, CoreError> {
        let entry = self.entry(id).await?;
        let mut guard = entry.write().await;

        let log = LogEntry {
            text: text.into(),
            timestamp: chrono::Utc::now(),
        };
        if guard.logs.len() >= self.log_retention {
            guard.logs.pop_front();
        }
        guard.logs.push_back(log.clone());
        Ok(log)
    }

    /// Retained log lines for a job, oldest first.
    pub async fn logs(&self, id: JobId) -> Result<Vec<LogEntry>, CoreError> {
        let entry = self.entry(id).await?;
        let guard = entry.read().await;
        Ok(guard.logs.iter().cloned().collect())
    }

    /// Look up a job's entry, releasing the map lock before returning.
    async fn entry(&self, id: JobId) -> Result<Arc<RwLock<JobEntry>>, CoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(id))
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use scribeflow_core::error_info::{ErrorInfo, ErrorKind};
    use scribeflow_core::job::JobStatus;

    use super::*;

    fn submission(topic: &str) -> SubmitJob {
        SubmitJob::new(topic, None)
    }

    async fn finish(registry: &JobRegistry, id: JobId) {
        registry
            .update(id, JobUpdate::new().with_status(JobStatus::InProgress))
            .await
            .unwrap();
        registry
            .update(
                id,
                JobUpdate::new()
                    .with_status(JobStatus::Completed)
                    .with_progress(100.0)
                    .with_result("done"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_assigns_unique_ids_and_queues() {
        let registry = JobRegistry::new();
        let a = registry.create(submission("a")).await;
        let b = registry.create(submission("b")).await;

        assert_ne!(a.id, b.id);
        assert_eq!(a.status, JobStatus::Queued);
        assert_eq!(a.progress, 0.0);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let registry = JobRegistry::new();
        let err = registry.get(uuid::Uuid::new_v4()).await.unwrap_err();
        assert_matches!(err, CoreError::NotFound { entity: "Job", .. });
    }

    #[tokio::test]
    async fn update_returns_new_snapshot() {
        let registry = JobRegistry::new();
        let job = registry.create(submission("topic")).await;

        let updated = registry
            .update(
                job.id,
                JobUpdate::new()
                    .with_status(JobStatus::InProgress)
                    .with_progress(25.0)
                    .with_current_step("Drafting"),
            )
            .await
            .unwrap();

        assert_eq!(updated.status, JobStatus::InProgress);
        assert_eq!(updated.progress, 25.0);
        assert_eq!(registry.get(job.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn rejected_update_leaves_job_untouched() {
        let registry = JobRegistry::new();
        let job = registry.create(submission("topic")).await;

        let err = registry
            .update(job.id, JobUpdate::new().with_status(JobStatus::Completed))
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::InvalidState(_));
        assert_eq!(registry.get(job.id).await.unwrap(), job);
    }

    #[tokio::test]
    async fn delete_non_terminal_is_invalid_state() {
        let registry = JobRegistry::new();
        let job = registry.create(submission("topic")).await;

        assert_matches!(
            registry.delete(job.id).await,
            Err(CoreError::InvalidState(_))
        );
        assert!(registry.get(job.id).await.is_ok());
    }

    #[tokio::test]
    async fn delete_terminal_makes_job_unresolvable() {
        let registry = JobRegistry::new();
        let job = registry.create(submission("topic")).await;
        finish(&registry, job.id).await;

        let deleted = registry.delete(job.id).await.unwrap();
        assert_eq!(deleted.status, JobStatus::Completed);
        assert_matches!(registry.get(job.id).await, Err(CoreError::NotFound { .. }));
        assert_matches!(registry.logs(job.id).await, Err(CoreError::NotFound { .. }));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn failed_jobs_can_be_deleted() {
        let registry = JobRegistry::new();
        let job = registry.create(submission("topic")).await;
        registry
            .update(job.id, JobUpdate::new().with_status(JobStatus::InProgress))
            .await
            .unwrap();
        registry
            .update(
                job.id,
                JobUpdate::new()
                    .with_status(JobStatus::Failed)
                    .with_error(ErrorInfo::new(ErrorKind::Network, "reset by peer")),
            )
            .await
            .unwrap();

        assert!(registry.delete(job.id).await.is_ok());
    }

    #[tokio::test]
    async fn log_retention_keeps_most_recent_lines() {
        let registry = JobRegistry::with_log_retention(3);
        let job = registry.create(submission("topic")).await;

        for i in 0..5 {
            registry.append_log(job.id, format!("line {i}")).await.unwrap();
        }

        let logs = registry.logs(job.id).await.unwrap();
        let texts: Vec<_> = logs.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["line 2", "line 3", "line 4"]);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_counts_active() {
        let registry = JobRegistry::new();
        let first = registry.create(submission("first")).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = registry.create(submission("second")).await;
        finish(&registry, first.id).await;

        let jobs = registry.list().await;
        assert_eq!(jobs[0].id, second.id);
        assert_eq!(jobs[1].id, first.id);
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_readers_never_observe_torn_or_regressing_progress() {
        let registry = Arc::new(JobRegistry::new());
        let job = registry.create(submission("topic")).await;
        registry
            .update(job.id, JobUpdate::new().with_status(JobStatus::InProgress))
            .await
            .unwrap();

        let writer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for step in 1..=100 {
                    registry
                        .update(
                            job.id,
                            JobUpdate::new()
                                .with_progress(step as f64)
                                .with_current_step(format!("step {step}")),
                        )
                        .await
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let mut last = 0.0;
                    for _ in 0..200 {
                        let snap = registry.get(job.id).await.unwrap();
                        assert!(snap.progress >= last);
                        if snap.progress > 0.0 {
                            assert_eq!(snap.current_step, format!("step {}", snap.progress as u32));
                        }
                        last = snap.progress;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(registry.get(job.id).await.unwrap().progress, 100.0);
    }
}
