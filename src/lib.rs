//! # jobq
//!
//! A concurrent async job queue for Rust applications.
//!
//! ## Features
//!
//! - **Typed tasks**: any `Send` value can be a task; a [`Processor`] turns it
//!   into an output
//! - **Prioritized retries**: a processor can ask for another attempt, and
//!   retried tasks are picked up before fresh ones
//! - **Pull-based results**: outcomes are read from a bounded stream, which
//!   throttles the workers when the consumer falls behind
//! - **Groups**: track progress and results of a subset of tasks
//! - **Observability**: progress, speed and worker statistics, `tracing` logs
//!
//! ## Quick Start
//!
//! ```rust
//! use jobq::prelude::*;
//!
//! struct Resize {
//!     width: u32,
//! }
//!
//! struct Resizer;
//!
//! #[async_trait]
//! impl Processor<Resize> for Resizer {
//!     type Output = u32;
//!
//!     async fn process(&self, task: &mut Resize) -> JobqResult<u32> {
//!         if task.width == 0 {
//!             return Err(JobqError::task_failed("empty image"));
//!         }
//!         Ok(task.width / 2)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> JobqResult<()> {
//!     let queue = JobQueue::new(Resizer, 4, 32)?;
//!     queue.start().await?;
//!
//!     let thumbnails = queue.group();
//!     thumbnails.add(Resize { width: 640 }).await?;
//!     queue.add(Resize { width: 1920 }).await?;
//!
//!     thumbnails.wait().await;
//!     thumbnails.close().await;
//!     assert_eq!(thumbnails.next().await.unwrap()?, 320);
//!
//!     queue.wait_for_completion().await;
//!     queue.stop().await?;
//!     while let Some(outcome) = queue.next().await {
//!         println!("resized: {:?}", outcome);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod queue;
pub mod task;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::core::{Group, JobQueue, QueueState, TaskGroup};
    pub use crate::error::{JobqError, JobqResult};
    pub use crate::queue::QueueStats;
    pub use crate::task::{JobId, ProcessFn, Processor, process_fn};
    pub use async_trait::async_trait;
}

pub use crate::config::*;
pub use crate::core::{Counter, CounterSnapshot, Group, JobQueue, QueueState, TaskGroup};
pub use crate::error::{JobqError, JobqResult};
pub use crate::queue::{QueueStats, ResultSink};
pub use crate::task::{JobId, ProcessFn, Processor, process_fn};
pub use async_trait::async_trait;
