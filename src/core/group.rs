//! Groups: tracked subsets of a queue's tasks.

use crate::core::job::Tracker;
use crate::error::JobqResult;
use crate::queue::Dispatch;
use crate::task::JobId;
use std::sync::Arc;

/// A view over the tasks submitted through it.
///
/// Tasks added to a group are processed by the queue's workers like any
/// other task and still show up on the queue's own stream and statistics.
/// The group additionally keeps its own progress, speed and result stream
/// covering only its tasks.
///
/// The owner closes the group with [`close`](Group::close) once it no longer
/// needs the stream; this never affects the queue. Clones share the same
/// tracker.
pub struct Group<T, O> {
    id: uuid::Uuid,
    dispatch: Arc<Dispatch<T, O>>,
    tracker: Arc<Tracker<O>>,
}

impl<T, O> Group<T, O>
where
    T: Send + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(dispatch: Arc<Dispatch<T, O>>) -> Self {
        let tracker = Tracker::new(dispatch.capacity);
        let id = uuid::Uuid::new_v4();
        tracing::debug!("Created group {}", id);
        Self {
            id,
            dispatch,
            tracker,
        }
    }

    /// Identifier of this group, for logs.
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Submit a task through the queue, tracked by this group as well.
    ///
    /// Waits while the queue's pending buffer is full. Fails with
    /// [`JobqError::Stopped`](crate::JobqError::Stopped) once the queue is
    /// stopped.
    pub async fn add(&self, task: T) -> JobqResult<JobId> {
        let job = self
            .dispatch
            .job(task)
            .tracked_by(Arc::clone(&self.tracker));
        self.dispatch.submit(job).await
    }

    /// Next outcome of a task of this group, or `None` once the group is
    /// closed and its stream drained.
    pub async fn next(&self) -> Option<JobqResult<O>> {
        self.tracker.sink.next().await
    }

    /// Wait until every task added to this group so far has completed.
    pub async fn wait(&self) {
        self.tracker.counter.drain().await
    }

    /// Close the group's result stream. The queue's stream is unaffected.
    ///
    /// Outcomes of group tasks still in flight are dropped from the group
    /// stream (they still reach the queue's), so close after
    /// [`wait`](Group::wait) to keep them.
    pub async fn close(&self) {
        if !self.tracker.sink.close().await {
            tracing::warn!("Group {} closed twice", self.id);
        }
    }

    /// Fraction of this group's tasks that completed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.tracker.counter.progress()
    }

    /// Completed group tasks per second since the group was created.
    pub fn speed(&self) -> f64 {
        self.tracker.counter.throughput()
    }

    /// Submitted and completed counts of this group.
    pub fn snapshot(&self) -> crate::core::CounterSnapshot {
        self.tracker.counter.snapshot()
    }
}

impl<T, O> Clone for Group<T, O> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            dispatch: Arc::clone(&self.dispatch),
            tracker: Arc::clone(&self.tracker),
        }
    }
}

impl<T, O> std::fmt::Debug for Group<T, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group").field("id", &self.id).finish()
    }
}
