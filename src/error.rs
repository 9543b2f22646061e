//! Error types for jobq operations.
//!
//! A single [`JobqError`] covers both sides of the queue: the values a
//! [`Processor`](crate::task::Processor) returns to report a failed attempt,
//! and the errors the queue itself raises on misuse or misconfiguration.
//! Errors are `Clone` because one outcome is delivered to every result
//! stream that tracks the job.

use std::sync::Arc;
use thiserror::Error;

/// Result type used throughout jobq.
pub type JobqResult<T> = Result<T, JobqError>;

/// Shared, cloneable error source.
pub type ErrorSource = Arc<dyn std::error::Error + Send + Sync>;

/// Main error type for jobq operations.
#[derive(Error, Debug, Clone)]
pub enum JobqError {
    /// Task processing failed permanently
    #[error("Task failed: {message}")]
    TaskFailed {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<ErrorSource>,
    },

    /// The attempt failed and the task must be processed again.
    ///
    /// Returned by a processor, this is a scheduling signal and never reaches
    /// a result stream.
    #[error("retry{}", .source.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    Retry {
        /// Optional cause, kept for diagnostics only
        #[source]
        source: Option<ErrorSource>,
    },

    /// The task kept asking for a retry past the configured ceiling
    #[error("Task gave up after {attempts} attempts")]
    RetriesExhausted {
        /// Number of processor invocations made
        attempts: u32,
        /// Cause carried by the last retry signal
        #[source]
        source: Option<ErrorSource>,
    },

    /// The processor panicked while handling the task
    #[error("Task panicked: {message}")]
    TaskPanicked {
        /// Panic payload, when it was a string
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Error message
        message: String,
    },

    /// Configuration could not be (de)serialized
    #[error("Serialization error: {0}")]
    SerializationError(#[source] Arc<serde_json::Error>),

    /// The queue has already been started
    #[error("Queue is already running")]
    AlreadyRunning,

    /// The queue is not running
    #[error("Queue is not running")]
    NotRunning,

    /// The queue has been stopped and accepts no more tasks
    #[error("Queue is stopped")]
    Stopped,

    /// The result sink was closed by its owner
    #[error("Result sink is closed")]
    SinkClosed,
}

impl From<serde_json::Error> for JobqError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(Arc::new(err))
    }
}

impl JobqError {
    /// Create a terminal task error without an underlying cause.
    pub fn task_failed(message: impl Into<String>) -> Self {
        Self::TaskFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a terminal task error wrapping its cause.
    pub fn task<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TaskFailed {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Ask the queue to process the task again.
    pub fn retry() -> Self {
        Self::Retry { source: None }
    }

    /// Ask the queue to process the task again, keeping the cause for logs.
    pub fn retry_with<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Retry {
            source: Some(Arc::new(cause)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Whether this error is a retry signal rather than a terminal failure.
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }

    /// Turn a retry signal into the terminal error reported once the retry
    /// ceiling is hit. Other errors are returned unchanged.
    pub(crate) fn exhausted(self, attempts: u32) -> Self {
        match self {
            Self::Retry { source } => Self::RetriesExhausted { attempts, source },
            other => other,
        }
    }
}
