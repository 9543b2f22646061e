//! Buffers between submitters, workers and consumers.
//!
//! Three channels move jobs and outcomes through a queue:
//! - **Pending**: bounded by the queue capacity; `add` waits while it is full.
//! - **Retry**: jobs whose last attempt asked to be retried. Workers drain it
//!   before taking new work, so a retried job never waits behind fresh ones.
//! - **Results**: one [`ResultSink`] per tracker, see [`sink`].

use crate::core::job::{Job, Tracker};
use crate::error::{JobqError, JobqResult};
use crate::task::JobId;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

pub mod sink;
pub use sink::ResultSink;

/// Statistics about the queue state
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStats {
    /// Number of tasks submitted
    pub submitted: u64,
    /// Number of tasks whose outcome was delivered
    pub completed: u64,
    /// Number of attempts that asked for a retry
    pub retried: u64,
    /// Number of tasks delivered with an error
    pub failed: u64,
    /// Number of attempts that panicked
    pub panicked: u64,
    /// Number of workers currently running
    pub active_workers: usize,
    /// Fraction of submitted tasks completed
    pub progress: f64,
    /// Completed tasks per second
    pub speed: f64,
}

/// Create the pending and retry buffers.
///
/// The retry buffer never needs more room than there are workers: a worker
/// pushes at most one job there before going back to the intake, where retry
/// work is taken first.
pub(crate) fn buffers<T, O>(
    capacity: usize,
    workers: usize,
) -> (
    mpsc::Sender<Job<T, O>>,
    mpsc::Sender<Job<T, O>>,
    Intake<T, O>,
) {
    let (pending_tx, pending) = mpsc::channel(capacity);
    let (retry_tx, retry) = mpsc::channel(workers);
    (pending_tx, retry_tx, Intake { pending, retry })
}

/// The receiving ends of the pending and retry buffers, shared by all
/// workers behind one lock.
pub(crate) struct Intake<T, O> {
    pending: mpsc::Receiver<Job<T, O>>,
    retry: mpsc::Receiver<Job<T, O>>,
}

impl<T, O> Intake<T, O> {
    /// Wait for the next job, retries first.
    ///
    /// Returns `None` once the pending buffer is closed and drained and no
    /// retry is waiting, which tells the worker to exit.
    pub(crate) async fn next(&mut self) -> Option<Job<T, O>> {
        tokio::select! {
            biased;

            Some(job) = self.retry.recv() => Some(job),
            job = self.pending.recv() => match job {
                Some(job) => Some(job),
                None => self.retry.try_recv().ok(),
            },
        }
    }
}

/// The submission side of a queue, shared with its groups.
pub(crate) struct Dispatch<T, O> {
    pending: Mutex<Option<mpsc::Sender<Job<T, O>>>>,
    pub(crate) tracker: Arc<Tracker<O>>,
    pub(crate) capacity: usize,
}

impl<T, O> Dispatch<T, O>
where
    T: Send,
    O: Clone + Send,
{
    pub(crate) fn new(pending: mpsc::Sender<Job<T, O>>, capacity: usize) -> Self {
        Self {
            pending: Mutex::new(Some(pending)),
            tracker: Tracker::new(capacity),
            capacity,
        }
    }

    /// Wrap a task in a job reporting to the queue's own tracker.
    pub(crate) fn job(&self, task: T) -> Job<T, O> {
        Job::new(task, Arc::clone(&self.tracker))
    }

    /// Count the job and hand it to the workers, waiting for room in the
    /// pending buffer.
    ///
    /// The slot is reserved before anything is counted, so dropping this
    /// future while it waits leaves no trace.
    pub(crate) async fn submit(&self, job: Job<T, O>) -> JobqResult<JobId> {
        let pending = self.pending.lock().await.clone().ok_or(JobqError::Stopped)?;
        let permit = pending.reserve().await.map_err(|_| JobqError::Stopped)?;

        job.on_submit();
        let id = job.id;
        permit.send(job);

        tracing::debug!("Submitted job {}", id);
        Ok(id)
    }

    /// Stop accepting submissions. Workers exit once the buffer is drained.
    pub(crate) async fn close(&self) {
        self.pending.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    type TestJob = Job<&'static str, ()>;

    fn job(tracker: &Arc<Tracker<()>>, task: &'static str) -> TestJob {
        Job::new(task, Arc::clone(tracker))
    }

    #[tokio::test]
    async fn test_intake_prefers_retries() {
        let tracker = Tracker::new(8);
        let (pending_tx, retry_tx, mut intake) = buffers(8, 2);

        pending_tx.send(job(&tracker, "fresh-1")).await.ok().unwrap();
        pending_tx.send(job(&tracker, "fresh-2")).await.ok().unwrap();
        retry_tx.send(job(&tracker, "retried")).await.ok().unwrap();

        assert_eq!(intake.next().await.unwrap().task, "retried");
        assert_eq!(intake.next().await.unwrap().task, "fresh-1");

        retry_tx.send(job(&tracker, "retried-again")).await.ok().unwrap();
        assert_eq!(intake.next().await.unwrap().task, "retried-again");
        assert_eq!(intake.next().await.unwrap().task, "fresh-2");
    }

    #[tokio::test]
    async fn test_intake_exhausted_after_close() {
        let tracker = Tracker::new(8);
        let (pending_tx, retry_tx, mut intake) = buffers(8, 1);

        pending_tx.send(job(&tracker, "last")).await.ok().unwrap();
        drop(pending_tx);

        assert_eq!(intake.next().await.unwrap().task, "last");

        retry_tx.send(job(&tracker, "late-retry")).await.ok().unwrap();
        assert_eq!(intake.next().await.unwrap().task, "late-retry");

        assert!(intake.next().await.is_none());
    }

    #[tokio::test]
    async fn test_intake_waits_for_work() {
        let (_pending_tx, _retry_tx, mut intake) = buffers::<&'static str, ()>(1, 1);
        let idle = timeout(Duration::from_millis(50), intake.next()).await;
        assert!(idle.is_err());
    }

    #[tokio::test]
    async fn test_dispatch_counts_and_closes() {
        let (pending_tx, _retry_tx, mut intake) = buffers(2, 1);
        let dispatch: Dispatch<&'static str, ()> = Dispatch::new(pending_tx, 2);

        let id = dispatch.submit(dispatch.job("a")).await.unwrap();
        assert_eq!(dispatch.tracker.counter.snapshot().submitted, 1);
        assert_eq!(intake.next().await.unwrap().id, id);

        dispatch.close().await;
        let err = dispatch.submit(dispatch.job("b")).await.unwrap_err();
        assert!(matches!(err, JobqError::Stopped));
        assert_eq!(dispatch.tracker.counter.snapshot().submitted, 1);
        assert!(intake.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_submit_is_not_counted() {
        let (pending_tx, _retry_tx, _intake) = buffers(1, 1);
        let dispatch: Dispatch<&'static str, ()> = Dispatch::new(pending_tx, 1);

        dispatch.submit(dispatch.job("fits")).await.unwrap();
        let full = timeout(Duration::from_millis(50), dispatch.submit(dispatch.job("waits"))).await;
        assert!(full.is_err());

        assert_eq!(dispatch.tracker.counter.snapshot().submitted, 1);
    }
}
