//! Configuration types for jobq.
//!
//! This module contains the configuration structures used by a
//! [`JobQueue`](crate::core::JobQueue): the worker pool size, buffer capacity
//! and retry ceiling, and the logging setup.

use crate::error::{JobqError, JobqResult};
use serde::{Deserialize, Serialize};

/// Largest buffer a tokio channel accepts. Capacity sizes the pending buffer
/// and every result stream, and the worker count sizes the retry buffer.
pub const MAX_BUFFER: usize = usize::MAX >> 3;

/// Main configuration for jobq.
///
/// # Examples
///
/// ```rust
/// use jobq::config::{JobqConfig, QueueConfig, WorkerConfig};
///
/// // Use default configuration
/// let config = JobqConfig::default();
///
/// // Custom configuration
/// let config = JobqConfig {
///     workers: WorkerConfig::with_workers(8),
///     queue: QueueConfig::default().with_capacity(256).with_max_retries(5),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobqConfig {
    /// Worker pool configuration
    pub workers: WorkerConfig,

    /// Buffer and retry configuration
    pub queue: QueueConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of workers to spawn
    pub num_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get().max(1),
        }
    }
}

impl WorkerConfig {
    /// Create a new worker configuration with a specific number of workers.
    pub fn with_workers(num_workers: usize) -> Self {
        Self { num_workers }
    }
}

/// Buffer and retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Size of the pending buffer and of every result stream
    pub capacity: usize,

    /// Retries allowed per task before it fails with
    /// [`JobqError::RetriesExhausted`]. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_retries: None,
        }
    }
}

impl QueueConfig {
    /// Set the buffer capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Cap the number of retries per task.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: LogLevel,

    /// Enable colored output
    pub colored: bool,

    /// Include timestamps in logs
    pub include_timestamps: bool,

    /// Include target module in logs
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            colored: true,
            include_timestamps: true,
            include_targets: false,
        }
    }
}

impl LoggingConfig {
    /// Install a global `tracing` subscriber built from this configuration.
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(&self) -> JobqResult<()> {
        let builder = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::from(self.level.clone()))
            .with_ansi(self.colored)
            .with_target(self.include_targets);

        let installed = if self.include_timestamps {
            builder.try_init()
        } else {
            builder.without_time().try_init()
        };

        installed.map_err(|e| JobqError::config(format!("failed to install logger: {e}")))
    }
}

/// Log level enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl JobqConfig {
    /// Create a new configuration optimized for development.
    pub fn development() -> Self {
        Self {
            workers: WorkerConfig::with_workers(2),
            queue: QueueConfig {
                capacity: 64,
                max_retries: Some(10),
            },
            logging: LoggingConfig {
                level: LogLevel::Debug,
                include_targets: true,
                ..Default::default()
            },
        }
    }

    /// Create a new configuration optimized for production.
    pub fn production() -> Self {
        Self {
            workers: WorkerConfig::with_workers(num_cpus::get() * 2),
            queue: QueueConfig {
                capacity: 4096,
                max_retries: None,
            },
            logging: LoggingConfig {
                level: LogLevel::Info,
                colored: false,
                ..Default::default()
            },
        }
    }

    /// Create a configuration for testing.
    pub fn testing() -> Self {
        Self {
            workers: WorkerConfig::with_workers(1),
            queue: QueueConfig {
                capacity: 16,
                max_retries: Some(3),
            },
            logging: LoggingConfig {
                level: LogLevel::Debug,
                colored: false,
                include_timestamps: false,
                include_targets: true,
            },
        }
    }

    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> JobqResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config
            .validate()
            .map_err(|errors| JobqError::config(errors.join("; ")))?;
        Ok(config)
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.workers.num_workers == 0 {
            errors.push("Number of workers must be greater than 0".to_string());
        }

        if self.workers.num_workers > MAX_BUFFER {
            errors.push(format!("Number of workers must not exceed {}", MAX_BUFFER));
        }

        if self.queue.capacity == 0 {
            errors.push("Queue capacity must be greater than 0".to_string());
        }

        if self.queue.capacity > MAX_BUFFER {
            errors.push(format!("Queue capacity must not exceed {}", MAX_BUFFER));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
