//! Bounded result streams.
//!
//! A [`ResultSink`] is the channel through which outcomes reach a consumer.
//! Workers are the producers; the owner of the queue or group pulls with
//! [`ResultSink::next`]. A full sink suspends the producing worker, so a
//! consumer that stops reading eventually stalls the pool.

use crate::error::{JobqError, JobqResult};
use tokio::sync::{Mutex, mpsc};

/// Bounded FIFO of outcomes with a close-once producer side.
#[derive(Debug)]
pub struct ResultSink<R> {
    tx: Mutex<Option<mpsc::Sender<R>>>,
    rx: Mutex<mpsc::Receiver<R>>,
    capacity: usize,
}

impl<R: Send> ResultSink<R> {
    /// Create a sink holding at most `capacity` undelivered items.
    ///
    /// `capacity` must be greater than zero.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            capacity,
        }
    }

    /// Append an item, waiting for room while the sink is full.
    ///
    /// Fails with [`JobqError::SinkClosed`] once the sink is closed.
    pub async fn store(&self, item: R) -> JobqResult<()> {
        // Clone the sender so a slow consumer never blocks `close`.
        let tx = self.tx.lock().await.clone().ok_or(JobqError::SinkClosed)?;
        tx.send(item).await.map_err(|_| JobqError::SinkClosed)
    }

    /// Take the next item, waiting for one to arrive.
    ///
    /// Returns `None` once the sink is closed and every stored item has been
    /// taken.
    pub async fn next(&self) -> Option<R> {
        self.rx.lock().await.recv().await
    }

    /// Close the producer side. Items already stored, and stores already in
    /// progress, are still delivered before the end of the stream.
    ///
    /// Returns `false` if the sink was already closed.
    pub async fn close(&self) -> bool {
        self.tx.lock().await.take().is_some()
    }

    /// Whether [`close`](Self::close) has been called.
    pub async fn is_closed(&self) -> bool {
        self.tx.lock().await.is_none()
    }

    /// Maximum number of undelivered items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
