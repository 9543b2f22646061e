//! The job queue and its worker pool.
//!
//! The [`JobQueue`] is the heart of jobq: it owns the workers, the pending
//! and retry buffers and the queue-wide result stream, and hands out
//! [`Group`]s for tracking subsets of the submitted tasks.

use crate::config::JobqConfig;
use crate::error::{JobqError, JobqResult};
use crate::queue::{self, Dispatch, Intake, QueueStats};
use crate::task::{JobId, Processor};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

pub mod counter;
pub mod group;
pub(crate) mod job;
pub(crate) mod worker;

pub use counter::{Counter, CounterSnapshot};
pub use group::Group;

use job::Job;
use worker::{Worker, WorkerStats};

/// Lifecycle of a [`JobQueue`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Built, accepting tasks, no workers yet
    Created,
    /// Workers are running
    Started,
    /// Stop was requested; workers finish the remaining work
    Draining,
    /// Workers have exited and the result stream is closed
    Stopped,
}

/// The operations shared by a queue and its groups.
///
/// Lets callers feed or consume either one through the same code.
#[async_trait]
pub trait TaskGroup<T: Send + 'static, O: Send + 'static>: Send + Sync {
    /// Submit a task.
    async fn add(&self, task: T) -> JobqResult<JobId>;

    /// Next outcome, or `None` at the end of the stream.
    async fn next(&self) -> Option<JobqResult<O>>;

    /// Wait until every task submitted so far has completed.
    async fn wait(&self);

    /// Close the result stream (and, for a queue, stop its workers).
    async fn close(&self) -> JobqResult<()>;

    /// Completed tasks per second.
    fn speed(&self) -> f64;

    /// Fraction of submitted tasks completed, in `[0, 1]`.
    fn progress(&self) -> f64;
}

/// A fixed pool of workers running a [`Processor`] against submitted tasks.
///
/// Outcomes are pulled with [`next`](JobQueue::next). Only terminal outcomes
/// are delivered: a task whose processor returns
/// [`JobqError::retry`](crate::JobqError::retry) is processed again, ahead of
/// tasks that have not been tried yet, and its single final outcome is
/// delivered once.
///
/// Both the pending buffer and the result stream are bounded by the
/// configured capacity. `add` waits while the pending buffer is full, and
/// workers wait while the result stream is full, so outcomes must be
/// consumed for the queue to make progress.
///
/// # Examples
///
/// ```rust
/// use jobq::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> JobqResult<()> {
///     let square = process_fn(|n: u64| async move { Ok::<_, JobqError>(n * n) });
///     let queue = std::sync::Arc::new(JobQueue::<u64, _>::new(square, 4, 16)?);
///     queue.start().await?;
///
///     let consumer = {
///         let queue = queue.clone();
///         tokio::spawn(async move {
///             let mut sum = 0;
///             while let Some(outcome) = queue.next().await {
///                 sum += outcome.unwrap_or_default();
///             }
///             sum
///         })
///     };
///
///     for n in 1..=10 {
///         queue.add(n).await?;
///     }
///     queue.wait_for_completion().await;
///     queue.stop().await?;
///
///     assert_eq!(consumer.await.unwrap(), 385);
///     Ok(())
/// }
/// ```
pub struct JobQueue<T, P>
where
    T: Send + 'static,
    P: Processor<T>,
{
    config: JobqConfig,
    processor: Arc<P>,
    dispatch: Arc<Dispatch<T, P::Output>>,
    intake: Arc<Mutex<Intake<T, P::Output>>>,
    retry_tx: mpsc::Sender<Job<T, P::Output>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    state: RwLock<QueueState>,
    stats: Arc<WorkerStats>,
}

impl<T, P> JobQueue<T, P>
where
    T: Send + 'static,
    P: Processor<T>,
{
    /// Create a queue with `num_workers` workers and buffers holding
    /// `capacity` items.
    ///
    /// Fails with [`JobqError::ConfigError`] if either number is zero.
    pub fn new(processor: P, num_workers: usize, capacity: usize) -> JobqResult<Self> {
        let mut config = JobqConfig::default();
        config.workers.num_workers = num_workers;
        config.queue.capacity = capacity;
        Self::with_config(config, processor)
    }

    /// Create a queue from a full configuration.
    pub fn with_config(config: JobqConfig, processor: P) -> JobqResult<Self> {
        config
            .validate()
            .map_err(|errors| JobqError::config(errors.join("; ")))?;

        let (pending_tx, retry_tx, intake) =
            queue::buffers(config.queue.capacity, config.workers.num_workers);

        Ok(Self {
            processor: Arc::new(processor),
            dispatch: Arc::new(Dispatch::new(pending_tx, config.queue.capacity)),
            intake: Arc::new(Mutex::new(intake)),
            retry_tx,
            workers: Mutex::new(Vec::new()),
            state: RwLock::new(QueueState::Created),
            stats: Arc::new(WorkerStats::default()),
            config,
        })
    }

    /// Spawn the workers on the current tokio runtime.
    ///
    /// Tasks added before this call are processed as soon as the workers are
    /// up. A queue is started at most once.
    pub async fn start(&self) -> JobqResult<()> {
        let mut state = self.state.write().await;
        match *state {
            QueueState::Created => {}
            QueueState::Started | QueueState::Draining => return Err(JobqError::AlreadyRunning),
            QueueState::Stopped => return Err(JobqError::Stopped),
        }

        let num_workers = self.config.workers.num_workers;
        tracing::info!("Starting jobq with {} workers", num_workers);

        let mut workers = self.workers.lock().await;
        for id in 0..num_workers {
            let worker = Worker::new(
                id,
                Arc::clone(&self.processor),
                Arc::clone(&self.intake),
                self.retry_tx.clone(),
                Arc::clone(&self.stats),
                self.config.queue.max_retries,
            );
            workers.push(worker.spawn());
        }

        *state = QueueState::Started;
        Ok(())
    }

    /// Stop accepting tasks, let the workers finish everything already
    /// submitted, then close the result stream.
    ///
    /// Returns once every worker has exited. Group streams stay open until
    /// their owners close them.
    pub async fn stop(&self) -> JobqResult<()> {
        {
            let mut state = self.state.write().await;
            if *state != QueueState::Started {
                return Err(JobqError::NotRunning);
            }
            *state = QueueState::Draining;
        }

        tracing::info!("Stopping jobq, draining remaining work...");
        self.dispatch.close().await;

        let handles = std::mem::take(&mut *self.workers.lock().await);
        let count = handles.len();
        let mut error_count = 0;
        for (i, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                error_count += 1;
                tracing::error!("Worker {} error: {}", i, e);
            }
        }

        self.dispatch.tracker.sink.close().await;
        *self.state.write().await = QueueState::Stopped;

        tracing::info!(
            "jobq stopped: {} workers joined, {} errors",
            count,
            error_count
        );
        Ok(())
    }

    /// Submit a task, waiting while the pending buffer is full.
    ///
    /// Fails with [`JobqError::Stopped`] once [`stop`](JobQueue::stop) has
    /// been called.
    pub async fn add(&self, task: T) -> JobqResult<JobId> {
        self.dispatch.submit(self.dispatch.job(task)).await
    }

    /// Next outcome of any task, or `None` once the queue is stopped and the
    /// stream drained.
    pub async fn next(&self) -> Option<JobqResult<P::Output>> {
        self.dispatch.tracker.sink.next().await
    }

    /// Wait until every task submitted so far has completed.
    pub async fn wait_for_completion(&self) {
        self.dispatch.tracker.counter.drain().await
    }

    /// Create a group bound to this queue.
    pub fn group(&self) -> Group<T, P::Output> {
        Group::new(Arc::clone(&self.dispatch))
    }

    /// Fraction of submitted tasks completed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.dispatch.tracker.counter.progress()
    }

    /// Completed tasks per second since the queue was created.
    pub fn speed(&self) -> f64 {
        self.dispatch.tracker.counter.throughput()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> QueueState {
        *self.state.read().await
    }

    /// Snapshot of counters and worker activity.
    pub fn stats(&self) -> QueueStats {
        let counter = &self.dispatch.tracker.counter;
        let snapshot = counter.snapshot();
        QueueStats {
            submitted: snapshot.submitted,
            completed: snapshot.completed,
            retried: self.stats.retried.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            panicked: self.stats.panicked.load(Ordering::Relaxed),
            active_workers: self.stats.active_workers.load(Ordering::SeqCst),
            progress: counter.progress(),
            speed: counter.throughput(),
        }
    }

    /// The configuration this queue was built with.
    pub fn config(&self) -> &JobqConfig {
        &self.config
    }
}

#[async_trait]
impl<T, P> TaskGroup<T, P::Output> for JobQueue<T, P>
where
    T: Send + 'static,
    P: Processor<T>,
{
    async fn add(&self, task: T) -> JobqResult<JobId> {
        JobQueue::add(self, task).await
    }

    async fn next(&self) -> Option<JobqResult<P::Output>> {
        JobQueue::next(self).await
    }

    async fn wait(&self) {
        self.wait_for_completion().await
    }

    async fn close(&self) -> JobqResult<()> {
        self.stop().await
    }

    fn speed(&self) -> f64 {
        JobQueue::speed(self)
    }

    fn progress(&self) -> f64 {
        JobQueue::progress(self)
    }
}

#[async_trait]
impl<T, O> TaskGroup<T, O> for Group<T, O>
where
    T: Send + 'static,
    O: Clone + Send + Sync + 'static,
{
    async fn add(&self, task: T) -> JobqResult<JobId> {
        Group::add(self, task).await
    }

    async fn next(&self) -> Option<JobqResult<O>> {
        Group::next(self).await
    }

    async fn wait(&self) {
        Group::wait(self).await
    }

    async fn close(&self) -> JobqResult<()> {
        Group::close(self).await;
        Ok(())
    }

    fn speed(&self) -> f64 {
        Group::speed(self)
    }

    fn progress(&self) -> f64 {
        Group::progress(self)
    }
}

impl<T, P> Drop for JobQueue<T, P>
where
    T: Send + 'static,
    P: Processor<T>,
{
    fn drop(&mut self) {
        // Workers drain the remaining work on their own once every handle to
        // the pending buffer is gone, but nobody will close the stream.
        if let Ok(state) = self.state.try_read() {
            if *state == QueueState::Started {
                tracing::warn!(
                    "JobQueue dropped while running. Call stop() explicitly for graceful shutdown."
                );
            }
        }
    }
}
