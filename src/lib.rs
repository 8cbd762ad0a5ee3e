//! admit-bench: concurrency benchmark for capacity-limited admission
//!
//! This crate evaluates two competing designs for admitting actors into a
//! capacity-limited pool through a shared remote store:
//!
//! - `ScriptedAdmission` performs the whole decision inside one atomic
//!   server-side script, so the capacity invariant holds under any
//!   interleaving.
//! - `RacyAdmission` composes independently-atomic store calls and is the
//!   negative control: it reproduces the overflow bug the benchmark exists
//!   to measure.
//!
//! The `Driver` spawns a bounded pool of tokio workers that claim attempt
//! indices from a shared counter and hammer one strategy; the `Benchmark`
//! resets pool state, times the run, and reports final occupancy per pool
//! so overflow is visible in the output.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admission;
pub mod bench;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod pool;
pub mod store;

pub use admission::{AdmissionStrategy, Outcome, RacyAdmission, ScriptedAdmission};
pub use bench::{BenchReport, Benchmark, OutcomeSummary, PoolReport};
pub use config::{ConfigError, DriverConfig};
pub use driver::{AttemptRecord, Driver, DriverBuilder, DriverRun, DriverStats};
pub use error::{Error, Result};
pub use pool::Pool;
pub use store::{AtomicScript, MemoryStore, RedisStore, RetryingStore, ScriptValue, StoreClient, StoreError};
