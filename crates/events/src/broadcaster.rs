//! Per-job fan-out of [`JobEvent`]s to observers.
//!
//! [`Broadcaster`] keeps, for every job, the set of observers subscribed to
//! it and one unbounded queue per subscription. Each job's set sits behind
//! its own lock; the outer map lock is only held to look up, insert or
//! remove a job's set. Subscribing, unsubscribing, publishing and pruning
//! therefore only contend with other operations on the same job. Observers
//! that drop their receiver are pruned on the next publish.
//!
//! Designed to be shared via `Arc<Broadcaster>`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;

use scribeflow_core::types::{JobId, ObserverId};

use crate::event::JobEvent;

/// Sender half of one subscription queue.
type EventSender = mpsc::UnboundedSender<JobEvent>;

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Receiving end of one observer's subscription to one job.
///
/// Events arrive in publish order. The stream ends when the job's subscriber
/// set is closed (job deleted) or the observer is unsubscribed.
#[derive(Debug)]
pub struct Subscription {
    pub observer_id: ObserverId,
    pub job_id: JobId,
    receiver: mpsc::UnboundedReceiver<JobEvent>,
}

impl Subscription {
    /// Wait for the next event; `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.receiver.recv().await
    }

    /// Take an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<JobEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<JobEvent> {
        UnboundedReceiverStream::new(self.receiver)
    }
}

// ---------------------------------------------------------------------------
// Broadcaster
// ---------------------------------------------------------------------------

/// Subscribers of one job.
///
/// `closed` is set when the set is detached from the map by
/// [`Broadcaster::close_job`]; a subscribe that raced the close retries
/// against a fresh set.
#[derive(Default)]
struct SubscriberSet {
    observers: HashMap<ObserverId, EventSender>,
    closed: bool,
}

type SharedSet = Arc<RwLock<SubscriberSet>>;

/// Mapping `job_id -> {observer_id -> queue}`.
pub struct Broadcaster {
    jobs: RwLock<HashMap<JobId, SharedSet>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe `observer` to `job`.
    ///
    /// Idempotent: if the observer already holds a live subscription for the
    /// job, returns `None` and the existing queue keeps receiving, so events
    /// are never delivered twice to the same observer.
    pub async fn subscribe(&self, observer: ObserverId, job: JobId) -> Option<Subscription> {
        loop {
            let set = self.set_or_insert(job).await;
            let mut set = set.write().await;
            if set.closed {
                continue;
            }

            if set.observers.get(&observer).is_some_and(|tx| !tx.is_closed()) {
                return None;
            }

            let (tx, rx) = mpsc::unbounded_channel();
            set.observers.insert(observer, tx);
            tracing::debug!(job_id = %job, observer_id = %observer, "Observer subscribed");

            return Some(Subscription {
                observer_id: observer,
                job_id: job,
                receiver: rx,
            });
        }
    }

    /// Remove one subscription. Returns whether it existed.
    pub async fn unsubscribe(&self, observer: ObserverId, job: JobId) -> bool {
        match self.set(job).await {
            Some(set) => set.write().await.observers.remove(&observer).is_some(),
            None => false,
        }
    }

    /// Remove every subscription held by `observer`. Returns how many were
    /// removed.
    pub async fn unsubscribe_all(&self, observer: ObserverId) -> usize {
        let sets: Vec<SharedSet> = self.jobs.read().await.values().cloned().collect();
        let mut removed = 0;
        for set in sets {
            if set.write().await.observers.remove(&observer).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Deliver `event` to every current subscriber of `job`.
    ///
    /// Returns the number of queues the event was handed to. Publishing to a
    /// job nobody observes is a no-op; late subscribers get no replay.
    pub async fn publish(&self, job: JobId, event: JobEvent) -> usize {
        let Some(set) = self.set(job).await else {
            return 0;
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let set = set.read().await;
            for (observer, tx) in &set.observers {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*observer);
                }
            }
        }

        if !closed.is_empty() {
            let mut set = set.write().await;
            // Re-check: the observer may have re-subscribed since the send.
            for observer in &closed {
                if set.observers.get(observer).is_some_and(|tx| tx.is_closed()) {
                    set.observers.remove(observer);
                    tracing::debug!(job_id = %job, observer_id = %observer, "Pruned closed subscription");
                }
            }
        }
        delivered
    }

    /// Drop every subscription for `job`; open subscriptions end.
    pub async fn close_job(&self, job: JobId) -> usize {
        let Some(set) = self.jobs.write().await.remove(&job) else {
            return 0;
        };

        let mut set = set.write().await;
        set.closed = true;
        let removed = set.observers.len();
        set.observers.clear();
        if removed > 0 {
            tracing::debug!(job_id = %job, removed, "Closed job subscriptions");
        }
        removed
    }

    /// Number of live subscriptions for `job`.
    pub async fn subscriber_count(&self, job: JobId) -> usize {
        match self.set(job).await {
            Some(set) => set
                .read()
                .await
                .observers
                .values()
                .filter(|tx| !tx.is_closed())
                .count(),
            None => 0,
        }
    }

    async fn set(&self, job: JobId) -> Option<SharedSet> {
        self.jobs.read().await.get(&job).cloned()
    }

    async fn set_or_insert(&self, job: JobId) -> SharedSet {
        if let Some(set) = self.set(job).await {
            return set;
        }
        Arc::clone(self.jobs.write().await.entry(job).or_default())
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
