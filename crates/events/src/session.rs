//! One observer's view of the jobs it follows.
//!
//! An [`ObserverSession`] merges the subscription queues of every job the
//! observer follows into a single event stream and keeps a local
//! [`TrackedJob`] record per job. Incoming events are merged monotonically:
//! anything older than what the record already shows is dropped, which makes
//! the at-least-once join flow (subscribe, then pull a snapshot) safe.
//!
//! Each record keeps at most `log_retention` log lines, oldest dropped
//! first, matching the registry's per-job bound.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{StreamExt, StreamMap};

use scribeflow_core::error::CoreError;
use scribeflow_core::error_info::ErrorInfo;
use scribeflow_core::job::{Job, JobStatus};
use scribeflow_core::types::{JobId, ObserverId};

use crate::broadcaster::{Broadcaster, Subscription};
use crate::event::JobEvent;

// ---------------------------------------------------------------------------
// TrackedJob
// ---------------------------------------------------------------------------

/// Observer-local record of a followed job.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedJob {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    pub message: String,
    pub logs: VecDeque<String>,
    pub result: Option<String>,
    pub error: Option<ErrorInfo>,
    log_retention: usize,
}

fn status_rank(status: JobStatus) -> u8 {
    match status {
        JobStatus::Queued => 0,
        JobStatus::InProgress => 1,
        JobStatus::Completed | JobStatus::Failed => 2,
    }
}

impl TrackedJob {
    fn new(id: JobId, log_retention: usize) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0.0,
            message: String::new(),
            logs: VecDeque::new(),
            result: None,
            error: None,
            log_retention: log_retention.max(1),
        }
    }

    /// Whether the terminal payload (content or error info) has arrived.
    fn is_settled(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// Merge one event. Returns `false` when the event was stale and ignored.
    pub fn apply(&mut self, event: &JobEvent) -> bool {
        if event.task_id() != self.id {
            return false;
        }

        match event {
            JobEvent::StatusUpdate {
                status,
                message,
                progress,
                ..
            } => {
                if self.is_settled() || self.status.is_terminal() {
                    return false;
                }
                let rank = status_rank(*status);
                let current = status_rank(self.status);
                if rank < current || (rank == current && *progress < self.progress) {
                    return false;
                }
                self.status = *status;
                self.progress = progress.max(self.progress);
                self.message = message.clone();
                true
            }
            JobEvent::LogUpdate { log, .. } => {
                if self.is_settled() {
                    return false;
                }
                if self.logs.len() >= self.log_retention {
                    self.logs.pop_front();
                }
                self.logs.push_back(log.clone());
                true
            }
            JobEvent::GenerationComplete {
                message, content, ..
            } => {
                if self.is_settled() || self.status == JobStatus::Failed {
                    return false;
                }
                self.status = JobStatus::Completed;
                self.progress = 100.0;
                self.message = message.clone();
                self.result = Some(content.clone());
                true
            }
            JobEvent::GenerationError { error_info, .. } => {
                if self.is_settled() || self.status == JobStatus::Completed {
                    return false;
                }
                self.status = JobStatus::Failed;
                self.message = error_info.user_message.clone();
                self.error = Some(error_info.clone());
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ObserverSession
// ---------------------------------------------------------------------------

/// Event merger and local job records for one observer.
pub struct ObserverSession {
    observer_id: ObserverId,
    broadcaster: Arc<Broadcaster>,
    streams: StreamMap<JobId, UnboundedReceiverStream<JobEvent>>,
    tracked: HashMap<JobId, TrackedJob>,
    log_retention: usize,
}

impl ObserverSession {
    /// `log_retention` bounds the log lines kept per followed job.
    pub fn new(
        observer_id: ObserverId,
        broadcaster: Arc<Broadcaster>,
        log_retention: usize,
    ) -> Self {
        Self {
            observer_id,
            broadcaster,
            streams: StreamMap::new(),
            tracked: HashMap::new(),
            log_retention,
        }
    }

    pub fn observer_id(&self) -> ObserverId {
        self.observer_id
    }

    /// Start (or refresh) following a job.
    ///
    /// `snapshot` must be pulled after `subscription` was taken. Returns the
    /// reconciliation events that changed the local record; these are what
    /// the observer should be shown. A `None` subscription means the
    /// observer is already subscribed and its existing queue is kept.
    pub fn follow(&mut self, snapshot: &Job, subscription: Option<Subscription>) -> Vec<JobEvent> {
        if let Some(subscription) = subscription {
            self.streams
                .insert(subscription.job_id, subscription.into_stream());
        }

        let log_retention = self.log_retention;
        let record = self
            .tracked
            .entry(snapshot.id)
            .or_insert_with(|| TrackedJob::new(snapshot.id, log_retention));

        JobEvent::reconcile(snapshot)
            .into_iter()
            .filter(|event| record.apply(event))
            .collect()
    }

    /// Merge an event into the matching local record.
    ///
    /// Events for jobs this session does not track (never followed, or
    /// forgotten) are dropped.
    pub fn apply(&mut self, event: &JobEvent) -> bool {
        match self.tracked.get_mut(&event.task_id()) {
            Some(record) => record.apply(event),
            None => false,
        }
    }

    /// Wait for the next fresh event across every followed job.
    ///
    /// Stale events are merged away and skipped. Returns `None` immediately
    /// when no subscription is open.
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        while let Some((job_id, event)) = self.streams.next().await {
            if self.apply(&event) {
                return Some(event);
            }
            tracing::trace!(observer_id = %self.observer_id, job_id = %job_id, "Dropped stale event");
        }
        None
    }

    /// Stop receiving events for a job. The local record is kept.
    ///
    /// Returns whether a subscription was open.
    pub async fn leave(&mut self, job_id: JobId) -> bool {
        let had_stream = self.streams.remove(&job_id).is_some();
        let had_subscription = self.broadcaster.unsubscribe(self.observer_id, job_id).await;
        had_stream || had_subscription
    }

    /// Drop the local record of a terminal job.
    ///
    /// Records still queued or in progress cannot be forgotten.
    pub async fn forget(&mut self, job_id: JobId) -> Result<TrackedJob, CoreError> {
        let record = self
            .tracked
            .get(&job_id)
            .ok_or_else(|| CoreError::job_not_found(job_id))?;

        if !record.status.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "Job {job_id} is {} and cannot be forgotten until it completes or fails",
                record.status
            )));
        }

        self.leave(job_id).await;
        self.tracked
            .remove(&job_id)
            .ok_or_else(|| CoreError::job_not_found(job_id))
    }

    pub fn tracked(&self, job_id: JobId) -> Option<&TrackedJob> {
        self.tracked.get(&job_id)
    }

    pub fn is_subscribed(&self, job_id: JobId) -> bool {
        self.streams.contains_key(&job_id)
    }

    /// Whether [`next_event`](Self::next_event) has anything to wait on.
    pub fn has_subscriptions(&self) -> bool {
        !self.streams.is_empty()
    }

    /// Release every subscription held by this observer.
    pub async fn close(mut self) {
        self.streams.clear();
        let removed = self.broadcaster.unsubscribe_all(self.observer_id).await;
        tracing::debug!(observer_id = %self.observer_id, removed, "Observer session closed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
