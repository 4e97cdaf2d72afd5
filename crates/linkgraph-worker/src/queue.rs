//! Job queue with a high and a low priority partition.
//!
//! [`JobQueue`] is the enqueue side the dispatcher and the retry path talk to.
//! [`InMemoryJobQueue`] backs it with two unbounded tokio channels; consumers
//! drain them through [`InMemoryJobQueue::next`], which always prefers the
//! high partition.
//!
//! The queue counts outstanding jobs (enqueued but not yet completed) so a
//! caller can wait until every fan-out generation has settled.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::messages::{DownstreamJob, Priority};

/// Enqueue side of a job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: DownstreamJob, priority: Priority);
}

/// A job taken off the queue, with the partition it came from.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: DownstreamJob,
    pub priority: Priority,
}

struct Receivers {
    high: mpsc::UnboundedReceiver<DownstreamJob>,
    low: mpsc::UnboundedReceiver<DownstreamJob>,
}

pub struct InMemoryJobQueue {
    high: mpsc::UnboundedSender<DownstreamJob>,
    low: mpsc::UnboundedSender<DownstreamJob>,
    receivers: Mutex<Receivers>,
    outstanding: AtomicUsize,
    idle: Notify,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (high, high_rx) = mpsc::unbounded_channel();
        let (low, low_rx) = mpsc::unbounded_channel();
        InMemoryJobQueue {
            high,
            low,
            receivers: Mutex::new(Receivers {
                high: high_rx,
                low: low_rx,
            }),
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    fn push(&self, job: DownstreamJob, priority: Priority) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let sender = match priority {
            Priority::High => &self.high,
            Priority::Low => &self.low,
        };
        // The receivers live as long as the queue, so sending cannot fail.
        if sender.send(job).is_err() {
            self.complete();
        }
    }

    /// Waits for the next job, high partition first.
    pub async fn next(&self) -> Option<QueuedJob> {
        let mut receivers = self.receivers.lock().await;
        let Receivers { high, low } = &mut *receivers;
        tokio::select! {
            biased;
            Some(job) = high.recv() => Some(QueuedJob { job, priority: Priority::High }),
            Some(job) = low.recv() => Some(QueuedJob { job, priority: Priority::Low }),
            else => None,
        }
    }

    /// Takes a job if one is waiting, high partition first.
    pub fn try_next(&self) -> Option<QueuedJob> {
        let mut receivers = self.receivers.try_lock().ok()?;
        if let Ok(job) = receivers.high.try_recv() {
            return Some(QueuedJob {
                job,
                priority: Priority::High,
            });
        }
        receivers.low.try_recv().ok().map(|job| QueuedJob {
            job,
            priority: Priority::Low,
        })
    }

    /// Marks one job taken from the queue as finished.
    pub fn complete(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        if previous <= 1 {
            self.idle.notify_waiters();
        }
    }

    /// Jobs enqueued and not yet completed.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Resolves once no job is queued or in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: DownstreamJob, priority: Priority) {
        tracing::debug!(
            content_id = %job.content_id,
            locale = %job.locale,
            target_store = job.target_store.as_str(),
            payload_version = job.intended_version,
            priority = ?priority,
            attempt = job.attempt,
            "enqueued downstream job"
        );
        self.push(job, priority);
    }
}
