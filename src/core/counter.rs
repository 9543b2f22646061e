//! Submission and completion accounting.
//!
//! A [`Counter`] backs the progress, speed and wait operations of a queue or
//! a group. Counts live in atomics so workers update them without locking;
//! the number of outstanding units is also published through a `watch`
//! channel, which is what [`Counter::drain`] waits on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Point-in-time view of a [`Counter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSnapshot {
    /// Units submitted so far
    pub submitted: u64,
    /// Units whose outcome was delivered
    pub completed: u64,
    /// Time since the counter was created
    pub elapsed: Duration,
}

/// Tracks submitted and completed units for one consumer.
#[derive(Debug)]
pub struct Counter {
    submitted: AtomicU64,
    completed: AtomicU64,
    outstanding: watch::Sender<u64>,
    created_at: Instant,
}

impl Counter {
    /// Create a counter; speed is measured from this instant.
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            outstanding,
            created_at: Instant::now(),
        }
    }

    /// Account for a newly submitted unit.
    pub fn record_submission(&self) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.outstanding.send_modify(|n| *n += 1);
    }

    /// Account for a unit whose outcome was delivered.
    pub fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Fraction of submitted units that completed, in `[0, 1]`.
    ///
    /// The two counts are read separately, so under concurrent submission the
    /// value is a slightly stale but never out-of-range snapshot. Returns 0
    /// when nothing was submitted.
    pub fn progress(&self) -> f64 {
        // completed first: every completion it observes had its submission
        // counted earlier, so the later read of submitted is never smaller.
        let completed = self.completed.load(Ordering::SeqCst);
        let submitted = self.submitted.load(Ordering::SeqCst);
        if submitted == 0 {
            return 0.0;
        }
        (completed as f64 / submitted as f64).min(1.0)
    }

    /// Completed units per second since creation.
    pub fn throughput(&self) -> f64 {
        let secs = self.created_at.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.completed.load(Ordering::SeqCst) as f64 / secs
    }

    /// Wait until every unit submitted so far has completed.
    ///
    /// Units submitted while waiting extend the wait, as long as they are
    /// submitted before the count of outstanding units reaches zero.
    pub async fn drain(&self) {
        let mut outstanding = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = outstanding.wait_for(|n| *n == 0).await;
    }

    /// Number of units submitted but not yet completed.
    pub fn outstanding(&self) -> u64 {
        *self.outstanding.borrow()
    }

    /// Read both counts and the elapsed time.
    pub fn snapshot(&self) -> CounterSnapshot {
        let completed = self.completed.load(Ordering::SeqCst);
        CounterSnapshot {
            submitted: self.submitted.load(Ordering::SeqCst),
            completed,
            elapsed: self.created_at.elapsed(),
        }
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}
