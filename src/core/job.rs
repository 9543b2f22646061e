//! Jobs and the trackers interested in them.
//!
//! Every consumer of outcomes (the queue itself, and each group) owns a
//! [`Tracker`]. A [`Job`] carries the list of trackers it must report to, so
//! one processed task updates every interested party exactly once.

use crate::core::counter::Counter;
use crate::error::JobqResult;
use crate::queue::sink::ResultSink;
use crate::task::JobId;
use std::sync::Arc;

/// A counter and a result stream that follow the same set of tasks.
#[derive(Debug)]
pub(crate) struct Tracker<O> {
    pub(crate) counter: Counter,
    pub(crate) sink: ResultSink<JobqResult<O>>,
}

impl<O: Send> Tracker<O> {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            counter: Counter::new(),
            sink: ResultSink::new(capacity),
        })
    }
}

/// A submitted task bound to the trackers that follow it.
pub(crate) struct Job<T, O> {
    pub(crate) id: JobId,
    pub(crate) task: T,
    pub(crate) attempts: u32,
    trackers: Vec<Arc<Tracker<O>>>,
}

impl<T, O> Job<T, O>
where
    O: Clone + Send,
{
    pub(crate) fn new(task: T, tracker: Arc<Tracker<O>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            task,
            attempts: 0,
            trackers: vec![tracker],
        }
    }

    /// Put `tracker` in front of the trackers already following this job.
    pub(crate) fn tracked_by(mut self, tracker: Arc<Tracker<O>>) -> Self {
        self.trackers.insert(0, tracker);
        self
    }

    /// Count the job as submitted on every tracker.
    ///
    /// Must run before the job is handed to a buffer, so a worker can never
    /// complete it before it was counted.
    pub(crate) fn on_submit(&self) {
        for tracker in &self.trackers {
            tracker.counter.record_submission();
        }
    }

    /// Deliver the final outcome to every tracker, in order.
    ///
    /// The outcome is stored before completion is recorded, so once a wait
    /// on a tracker returns its stream already holds every outcome.
    pub(crate) async fn on_outcome(self, outcome: JobqResult<O>) {
        for tracker in &self.trackers {
            if let Err(e) = tracker.sink.store(outcome.clone()).await {
                tracing::warn!("Dropped outcome of job {}: {}", self.id, e);
            }
            tracker.counter.record_completion();
        }
    }
}
