//! Task processing traits.

use crate::error::JobqResult;
use async_trait::async_trait;
use std::future::Future;

/// Unique identifier assigned to every submitted task
pub type JobId = uuid::Uuid;

/// Trait for the function a [`JobQueue`](crate::core::JobQueue) runs against
/// each submitted task.
///
/// The task is borrowed mutably so state kept inside it survives retries:
/// a processor that wants to bound its own retries can count attempts in the
/// task and stop returning [`JobqError::retry`](crate::JobqError::retry) past
/// a threshold.
///
/// Returning `Err` with a retry signal sends the task back for another
/// attempt; any other `Err` is delivered to the result streams as the task's
/// final outcome.
///
/// # Examples
///
/// ```rust
/// use jobq::prelude::*;
///
/// struct Fetch {
///     url: String,
///     attempts: u32,
/// }
///
/// struct Fetcher;
///
/// #[async_trait]
/// impl Processor<Fetch> for Fetcher {
///     type Output = usize;
///
///     async fn process(&self, task: &mut Fetch) -> JobqResult<usize> {
///         task.attempts += 1;
///         if task.url.is_empty() {
///             return Err(JobqError::task_failed("empty url"));
///         }
///         Ok(task.url.len())
///     }
/// }
/// ```
#[async_trait]
pub trait Processor<T: Send + 'static>: Send + Sync + 'static {
    /// The value produced for every successfully processed task
    type Output: Clone + Send + Sync + 'static;

    /// Process one attempt of the task.
    async fn process(&self, task: &mut T) -> JobqResult<Self::Output>;
}

/// [`Processor`] backed by an async closure.
///
/// Each attempt receives a clone of the task, so changes the closure makes
/// are not kept between retries.
#[derive(Debug, Clone)]
pub struct ProcessFn<F>(F);

/// Wrap an async closure as a [`Processor`].
///
/// ```rust
/// use jobq::prelude::*;
///
/// let double = process_fn(|n: u64| async move { Ok::<_, JobqError>(n * 2) });
/// let queue: JobQueue<u64, _> = JobQueue::new(double, 4, 64).unwrap();
/// # drop(queue);
/// ```
pub fn process_fn<F>(f: F) -> ProcessFn<F> {
    ProcessFn(f)
}

#[async_trait]
impl<T, F, Fut, O> Processor<T> for ProcessFn<F>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobqResult<O>> + Send + 'static,
    O: Clone + Send + Sync + 'static,
{
    type Output = O;

    async fn process(&self, task: &mut T) -> JobqResult<O> {
        (self.0)(task.clone()).await
    }
}
