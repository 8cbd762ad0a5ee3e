//! Pool data model and store key naming

use serde::{Deserialize, Serialize};

/// A capacity-limited resource tracked in the store.
///
/// A pool owns four keys in the store, all derived from its id:
/// the member collection, the admission counter, the declared capacity,
/// and the cached full flag. The capacity is fixed at reset time; the
/// member collection and counter are mutated only through admission
/// strategies during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    /// Pool identifier, unique within a benchmark run
    pub id: String,

    /// Maximum number of admitted actors
    pub capacity: u32,
}

impl Pool {
    /// Create a new pool descriptor
    pub fn new(id: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            capacity,
        }
    }

    /// Key of the member collection
    pub fn members_key(&self) -> String {
        format!("pool:{}:members", self.id)
    }

    /// Key of the admission counter
    pub fn count_key(&self) -> String {
        format!("pool:{}:count", self.id)
    }

    /// Key of the declared capacity
    pub fn capacity_key(&self) -> String {
        format!("pool:{}:capacity", self.id)
    }

    /// Key of the cached full flag
    ///
    /// The flag is a cached signal written by the first admission attempt
    /// that observes the pool reaching capacity. It is not re-derived on
    /// every check, which is exactly the staleness the racy strategy
    /// exposes.
    pub fn full_key(&self) -> String {
        format!("pool:{}:full", self.id)
    }
}
