//! Concurrency driver
//!
//! The driver turns "issue N admission attempts at concurrency K" into a
//! bounded pool of tokio worker tasks. Workers claim attempt indices from
//! a shared atomic counter, select a pool through an injected selector,
//! call the strategy, and stream one record per attempt through a channel
//! to a collector. The driver joins every worker before returning, so no
//! attempt is left running after `run` resolves.
//!
//! There is no ordering guarantee between attempts; correctness of the
//! strategies must not depend on any particular interleaving.
//!
//! # Example
//!
//! ```ignore
//! let driver = DriverBuilder::new()
//!     .attempts(500)
//!     .workers(64)
//!     .strategy(strategy)
//!     .pools(pools)
//!     .build()?;
//!
//! let run = driver.run().await?;
//! println!("admitted: {}", run.stats.admitted);
//! ```

mod builder;
mod executor;
mod stats;
mod worker;

pub use builder::DriverBuilder;
pub use executor::{Driver, DriverRun};
pub use stats::{aggregate_stats, AggregatedStats, DriverStats};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::admission::Outcome;

/// Maps an attempt index to an index into the driver's pool list.
///
/// The default selector picks uniformly at random, matching the reference
/// benchmark; tests inject deterministic selectors.
pub type PoolSelector = Arc<dyn Fn(usize) -> usize + Send + Sync>;

/// Result of one admission attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Attempt index, also the source of the actor id
    pub index: usize,

    /// Pool the attempt targeted
    pub pool_id: String,

    /// Actor that requested admission
    pub actor: String,

    /// Decision outcome
    pub outcome: Outcome,

    /// Wall-clock time of the attempt in milliseconds
    pub elapsed_ms: f64,

    /// Error message when the attempt failed against the store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the attempt resolved
    pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    /// Record for an attempt that never finished before the deadline
    pub(crate) fn timed_out(index: usize, pool_id: String) -> Self {
        Self {
            index,
            pool_id,
            actor: index.to_string(),
            outcome: Outcome::TimedOut,
            elapsed_ms: 0.0,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests;
