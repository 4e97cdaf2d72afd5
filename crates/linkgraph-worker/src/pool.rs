//! A pool of tokio tasks draining the job queue.
//!
//! Each task takes one job at a time and runs it through the
//! [`DownstreamWorker`]. Retryable failures go back on the queue, on the
//! same partition and with the same intended version, after an exponential
//! backoff. Everything else is logged and dropped: one failing job never
//! holds up the rest of a fan-out.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::WorkerError;
use crate::messages::DownstreamJob;
use crate::queue::{InMemoryJobQueue, JobQueue, QueuedJob};
use crate::worker::DownstreamWorker;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per job, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further one.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            backoff,
        }
    }

    /// Delay before re-running a job that has failed `attempt + 1` times.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Whether a job that has failed `attempt + 1` times may run again.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(5, Duration::from_millis(500))
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `size` worker tasks on the current runtime.
    pub fn spawn(
        size: usize,
        queue: Arc<InMemoryJobQueue>,
        worker: Arc<DownstreamWorker>,
        policy: RetryPolicy,
    ) -> Self {
        let handles = (0..size.max(1))
            .map(|index| {
                let queue = Arc::clone(&queue);
                let worker = Arc::clone(&worker);
                tokio::spawn(async move {
                    while let Some(queued) = queue.next().await {
                        run_job(&queue, &worker, policy, queued).await;
                    }
                    tracing::debug!(worker = index, "queue closed, worker exiting");
                })
            })
            .collect();
        WorkerPool { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stops every worker task. Jobs still queued stay queued.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

/// Runs one queued job and settles it: completed, dropped, or scheduled for
/// another attempt.
pub async fn run_job(
    queue: &Arc<InMemoryJobQueue>,
    worker: &DownstreamWorker,
    policy: RetryPolicy,
    queued: QueuedJob,
) {
    let QueuedJob { job, priority } = queued;
    let err = match worker.perform(&job).await {
        Ok(_) => {
            queue.complete();
            return;
        }
        Err(err) => err,
    };

    if !err.is_retryable() {
        report_dropped(&job, &err, "non-retryable failure");
        queue.complete();
        return;
    }
    if !policy.allows_retry(job.attempt) {
        report_dropped(&job, &err, "retries exhausted");
        queue.complete();
        return;
    }

    let delay = policy.delay(job.attempt);
    tracing::warn!(
        content_id = %job.content_id,
        locale = %job.locale,
        target_store = job.target_store.as_str(),
        payload_version = job.intended_version,
        attempt = job.attempt + 1,
        delay_ms = delay.as_millis() as u64,
        error = %err,
        "downstream job failed, retrying"
    );

    // The failed job stays outstanding until its retry is back on the queue.
    let queue = Arc::clone(queue);
    let retry = job.retried();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        queue.enqueue(retry, priority).await;
        queue.complete();
    });
}

fn report_dropped(job: &DownstreamJob, err: &WorkerError, reason: &str) {
    tracing::error!(
        content_id = %job.content_id,
        locale = %job.locale,
        target_store = job.target_store.as_str(),
        payload_version = job.intended_version,
        attempt = job.attempt + 1,
        error_kind = err.kind(),
        error = %err,
        "downstream job dropped: {}",
        reason
    );
}
