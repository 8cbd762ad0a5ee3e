//! Tests for the driver module

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::builder::DriverBuilder;
use crate::admission::{AdmissionStrategy, Outcome};
use crate::pool::Pool;
use crate::store::{StoreError, StoreResult};

// ============================================================================
// Mock strategy
// ============================================================================

struct MockStrategy {
    name: String,
    delay: Option<Duration>,
    fail_every: Option<usize>,
    counter: AtomicUsize,
}

impl MockStrategy {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: None,
            fail_every: None,
            counter: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn with_fail_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n);
        self
    }
}

#[async_trait]
impl AdmissionStrategy for MockStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn admit(&self, _pool: &Pool, _actor: &str) -> StoreResult<Outcome> {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(fail_every) = self.fail_every {
            if count > 0 && count % fail_every == 0 {
                return Err(StoreError::Unavailable("simulated failure".into()));
            }
        }

        Ok(Outcome::Admitted)
    }

    async fn occupancy(&self, _pool: &Pool) -> StoreResult<u64> {
        Ok(self.counter.load(Ordering::SeqCst) as u64)
    }

    async fn roster(&self, _pool: &Pool) -> StoreResult<Vec<String>> {
        Ok(Vec::new())
    }
}

fn two_pools() -> Vec<Pool> {
    vec![Pool::new("p0", 18), Pool::new("p1", 18)]
}

// ============================================================================
// Builder tests
// ============================================================================

#[test]
fn test_builder_missing_strategy() {
    let result = DriverBuilder::new().pools(two_pools()).build();
    assert!(result.is_err());
}

#[test]
fn test_builder_missing_pools() {
    let strategy = Arc::new(MockStrategy::new("mock"));
    let result = DriverBuilder::new().strategy(strategy).build();
    assert!(result.is_err());
}

#[test]
fn test_builder_invalid_config() {
    let strategy = Arc::new(MockStrategy::new("mock"));
    let result = DriverBuilder::new()
        .strategy(strategy)
        .pools(two_pools())
        .workers(0)
        .build();
    assert!(result.is_err());
}

// ============================================================================
// Run tests
// ============================================================================

#[tokio::test]
async fn test_every_attempt_produces_a_record() {
    let strategy = Arc::new(MockStrategy::new("mock"));
    let driver = DriverBuilder::new()
        .attempts(50)
        .workers(8)
        .strategy(strategy)
        .pools(two_pools())
        .build()
        .expect("build driver");

    let run = driver.run().await.expect("run failed");

    assert_eq!(run.records.len(), 50);
    assert_eq!(run.stats.admitted, 50);
    assert_eq!(run.stats.timed_out, 0);

    // Each index appears exactly once and in order after sorting.
    let indices: HashSet<usize> = run.records.iter().map(|r| r.index).collect();
    assert_eq!(indices.len(), 50);
    assert!(run.records.windows(2).all(|w| w[0].index < w[1].index));
}

#[tokio::test]
async fn test_zero_attempts_yields_empty_run() {
    let strategy = Arc::new(MockStrategy::new("mock"));
    let driver = DriverBuilder::new()
        .attempts(0)
        .workers(4)
        .strategy(strategy)
        .pools(two_pools())
        .build()
        .expect("build driver");

    let run = driver.run().await.expect("run failed");
    assert!(run.records.is_empty());
    assert_eq!(run.stats.total_attempts(), 0);
}

#[tokio::test]
async fn test_store_failures_do_not_stop_siblings() {
    let strategy = Arc::new(MockStrategy::new("mock").with_fail_every(5));
    let driver = DriverBuilder::new()
        .attempts(50)
        .workers(4)
        .strategy(strategy)
        .pools(two_pools())
        .build()
        .expect("build driver");

    let run = driver.run().await.expect("run failed");

    assert_eq!(run.records.len(), 50);
    assert!(run.stats.failed > 0);
    assert_eq!(run.stats.admitted + run.stats.failed, 50);

    for record in run.records.iter().filter(|r| r.outcome == Outcome::Failed) {
        assert!(record.error.as_deref().unwrap_or("").contains("simulated"));
    }
}

#[tokio::test]
async fn test_deadline_surfaces_unfinished_attempts() {
    let strategy = Arc::new(MockStrategy::new("slow").with_delay(Duration::from_millis(20)));
    let driver = DriverBuilder::new()
        .attempts(100)
        .workers(2)
        .deadline(Duration::from_millis(100))
        .strategy(strategy)
        .pools(two_pools())
        .build()
        .expect("build driver");

    let start = Instant::now();
    let run = driver.run().await.expect("run failed");
    let elapsed = start.elapsed();

    // 100 attempts at 20ms each over 2 workers would need a second; the
    // deadline cuts that short and the remainder is reported, not dropped.
    assert!(elapsed < Duration::from_millis(600));
    assert_eq!(run.records.len(), 100);
    assert!(run.stats.timed_out > 0);
    assert!(run.stats.admitted > 0);

    let timed_out = run
        .records
        .iter()
        .filter(|r| r.outcome == Outcome::TimedOut)
        .count();
    assert_eq!(timed_out, run.stats.timed_out);
}

#[tokio::test]
async fn test_selector_routes_attempts() {
    let strategy = Arc::new(MockStrategy::new("mock"));
    let driver = DriverBuilder::new()
        .attempts(10)
        .workers(4)
        .strategy(strategy)
        .pools(two_pools())
        .selector(Arc::new(|index| index % 2))
        .build()
        .expect("build driver");

    let run = driver.run().await.expect("run failed");

    let p0 = run.records.iter().filter(|r| r.pool_id == "p0").count();
    let p1 = run.records.iter().filter(|r| r.pool_id == "p1").count();
    assert_eq!(p0, 5);
    assert_eq!(p1, 5);

    // The actor id is derived from the attempt index.
    for record in &run.records {
        assert_eq!(record.actor, record.index.to_string());
    }
}

#[tokio::test]
async fn test_concurrency_speedup() {
    let strategy = Arc::new(MockStrategy::new("slow").with_delay(Duration::from_millis(20)));
    let driver = DriverBuilder::new()
        .attempts(10)
        .workers(5)
        .strategy(strategy)
        .pools(two_pools())
        .build()
        .expect("build driver");

    let start = Instant::now();
    let run = driver.run().await.expect("run failed");
    let elapsed = start.elapsed();

    // 10 attempts at 20ms each across 5 workers is 2 batches, well under
    // the 200ms a serial run would take.
    assert!(elapsed < Duration::from_millis(150));
    assert_eq!(run.stats.admitted, 10);
    assert_eq!(run.stats.total_workers, 5);
}

#[tokio::test]
async fn test_driver_debug_format() {
    let strategy = Arc::new(MockStrategy::new("mock-strategy"));
    let driver = DriverBuilder::new()
        .attempts(1)
        .strategy(strategy)
        .pools(two_pools())
        .build()
        .expect("build driver");

    let debug = format!("{driver:?}");
    assert!(debug.contains("Driver"));
    assert!(debug.contains("mock-strategy"));
}
