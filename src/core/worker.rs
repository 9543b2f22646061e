//! Worker implementation for jobq.
//!
//! Each worker repeatedly takes a job from the shared intake (retries before
//! pending work), runs the processor against it and routes the result: the
//! final outcome goes to the job's trackers, a retry signal sends the job
//! back to the retry buffer.

use crate::core::job::Job;
use crate::error::JobqError;
use crate::queue::Intake;
use crate::task::Processor;
use futures::FutureExt;
use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Counters shared by every worker of a queue
#[derive(Debug, Default)]
pub(crate) struct WorkerStats {
    pub(crate) active_workers: AtomicUsize,
    pub(crate) retried: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) panicked: AtomicU64,
}

/// Individual worker that processes jobs
pub(crate) struct Worker<T, P: Processor<T>>
where
    T: Send + 'static,
{
    id: usize,
    processor: Arc<P>,
    intake: Arc<Mutex<Intake<T, P::Output>>>,
    retry_tx: mpsc::Sender<Job<T, P::Output>>,
    stats: Arc<WorkerStats>,
    max_retries: Option<u32>,
    _task: PhantomData<fn(T)>,
}

impl<T, P> Worker<T, P>
where
    T: Send + 'static,
    P: Processor<T>,
{
    pub(crate) fn new(
        id: usize,
        processor: Arc<P>,
        intake: Arc<Mutex<Intake<T, P::Output>>>,
        retry_tx: mpsc::Sender<Job<T, P::Output>>,
        stats: Arc<WorkerStats>,
        max_retries: Option<u32>,
    ) -> Self {
        Self {
            id,
            processor,
            intake,
            retry_tx,
            stats,
            max_retries,
            _task: PhantomData,
        }
    }

    /// Spawn the worker loop on the current tokio runtime.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the worker loop until the intake is exhausted.
    pub(crate) async fn run(self) {
        self.stats.active_workers.fetch_add(1, Ordering::SeqCst);
        tracing::info!("🔨 Worker {} started", self.id);

        let mut processed = 0u64;
        loop {
            let job = {
                let mut intake = self.intake.lock().await;
                intake.next().await
            };

            match job {
                Some(job) => {
                    self.process(job).await;
                    processed += 1;
                }
                None => break,
            }
        }

        self.stats.active_workers.fetch_sub(1, Ordering::SeqCst);
        tracing::info!(
            "🔨 Worker {} finished after {} attempts",
            self.id,
            processed
        );
    }

    /// Run one attempt of the job and route its result.
    async fn process(&self, mut job: Job<T, P::Output>) {
        job.attempts = job.attempts.saturating_add(1);
        tracing::debug!(
            "🔨 Worker {} processing job {} (attempt {})",
            self.id,
            job.id,
            job.attempts
        );

        let attempt = AssertUnwindSafe(self.processor.process(&mut job.task))
            .catch_unwind()
            .await;

        let outcome = match attempt {
            Ok(outcome) => outcome,
            Err(panic) => {
                self.stats.panicked.fetch_add(1, Ordering::Relaxed);
                let message = panic_message(panic);
                tracing::error!(
                    "🔨 Worker {} job {} panicked: {}",
                    self.id,
                    job.id,
                    message
                );
                Err(JobqError::TaskPanicked { message })
            }
        };

        match outcome {
            Err(err) if err.is_retry() => self.retry(job, err).await,
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("🔨 Job {} failed: {}", job.id, err);
                job.on_outcome(Err(err)).await;
            }
            Ok(output) => job.on_outcome(Ok(output)).await,
        }
    }

    /// Send the job back for another attempt, unless it is out of retries.
    async fn retry(&self, job: Job<T, P::Output>, signal: JobqError) {
        let retries = job.attempts - 1;
        if self.max_retries.is_some_and(|max| retries >= max) {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "🔨 Job {} gave up after {} attempts",
                job.id,
                job.attempts
            );
            let attempts = job.attempts;
            job.on_outcome(Err(signal.exhausted(attempts))).await;
            return;
        }

        self.stats.retried.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("🔨 Job {} will be retried: {}", job.id, signal);

        if let Err(mpsc::error::SendError(job)) = self.retry_tx.send(job).await {
            // The intake outlives every worker, so this only happens if the
            // runtime is tearing the queue down.
            tracing::error!("🔨 Retry buffer closed, dropping retry of job {}", job.id);
            let attempts = job.attempts;
            job.on_outcome(Err(signal.exhausted(attempts))).await;
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
