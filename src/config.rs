//! Driver configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a driver run
///
/// Defines how many admission attempts are issued, how many concurrent
/// workers issue them, and an optional deadline after which unfinished
/// attempts are surfaced as timed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Total number of admission attempts to issue
    pub attempts: usize,

    /// Number of concurrent worker tasks
    pub workers: usize,

    /// Optional deadline for the whole run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            attempts: 100,
            workers: 16,
            deadline: None,
        }
    }
}

impl DriverConfig {
    /// Create a new config with the given attempt count
    pub fn new(attempts: usize) -> Self {
        Self {
            attempts,
            ..Default::default()
        }
    }

    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the run deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Validate the configuration.
    ///
    /// Zero attempts is valid and yields an empty run; zero workers is not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers(
                "worker count must be at least 1".into(),
            ));
        }

        if let Some(deadline) = self.deadline {
            if deadline.is_zero() {
                return Err(ConfigError::InvalidDeadline(
                    "deadline must be positive".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid workers: {0}")]
    InvalidWorkers(String),

    /// Invalid deadline
    #[error("Invalid deadline: {0}")]
    InvalidDeadline(String),

    /// A required field is missing
    #[error("Missing configuration: {0}")]
    Missing(&'static str),
}
