//! Worker execution loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, Semaphore};

use super::stats::DriverStats;
use super::{AttemptRecord, PoolSelector};
use crate::admission::{AdmissionStrategy, Outcome};
use crate::pool::Pool;

/// One worker in the driver's pool: claim an attempt index, admit, report,
/// repeat until the counter is exhausted or shutdown arrives.
///
/// Workers are stateless tokio tasks. They share the strategy and pool
/// list via `Arc` and send records through an mpsc channel; a store
/// failure produces a `Failed` record and never disturbs sibling attempts.
pub(crate) struct AttemptWorker {
    /// Unique worker identifier
    pub(crate) id: usize,

    /// Strategy under test (shared across workers)
    pub(crate) strategy: Arc<dyn AdmissionStrategy>,

    /// Pools attempts are distributed over
    pub(crate) pools: Arc<Vec<Pool>>,

    /// Attempt index to pool index mapping
    pub(crate) selector: PoolSelector,

    /// Channel sender for attempt records
    pub(crate) records_tx: mpsc::Sender<AttemptRecord>,

    /// In-flight admission limiter (shared semaphore)
    pub(crate) semaphore: Arc<Semaphore>,

    /// Shared attempt counter for fair work distribution
    pub(crate) counter: Arc<AtomicUsize>,

    /// Total attempts across all workers
    pub(crate) total: usize,
}

impl AttemptWorker {
    /// Run the worker loop, returning this worker's stats
    pub(crate) async fn run(self, mut shutdown: broadcast::Receiver<()>) -> DriverStats {
        let mut stats = DriverStats::new();
        stats.start();

        tracing::debug!(worker_id = self.id, "worker started");

        loop {
            let Some(index) = self.try_claim() else {
                break;
            };

            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::debug!(worker_id = self.id, "worker received shutdown signal");
                    break;
                }

                record = self.execute_one(index) => {
                    stats.record(record.outcome);

                    // Send errors only happen on teardown; stop quietly.
                    if self.records_tx.send(record).await.is_err() {
                        tracing::debug!(worker_id = self.id, "record channel closed, worker stopping");
                        break;
                    }
                }
            }
        }

        stats.stop();
        tracing::debug!(
            worker_id = self.id,
            resolved = stats.total_attempts(),
            admitted = stats.admitted,
            failed = stats.failed,
            "worker finished"
        );

        stats
    }

    /// Try to claim the next attempt index from the shared counter
    fn try_claim(&self) -> Option<usize> {
        let claimed = self.counter.fetch_add(1, Ordering::SeqCst);
        if claimed >= self.total {
            // Rollback the over-claim so the counter stays accurate for
            // other workers still checking.
            self.counter.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(claimed)
    }

    /// Execute a single admission attempt
    async fn execute_one(&self, index: usize) -> AttemptRecord {
        let pool = &self.pools[(self.selector)(index) % self.pools.len()];
        let actor = index.to_string();

        let permit = self.semaphore.acquire().await;
        let start = Instant::now();

        let (outcome, error) = match permit {
            Ok(_permit) => match self.strategy.admit(pool, &actor).await {
                Ok(outcome) => (outcome, None),
                Err(err) => {
                    tracing::warn!(
                        worker_id = self.id,
                        attempt = index,
                        pool = %pool.id,
                        error = %err,
                        "admission attempt failed"
                    );
                    (Outcome::Failed, Some(err.to_string()))
                }
            },
            Err(_) => (Outcome::Failed, Some("driver shut down".to_string())),
        };

        AttemptRecord {
            index,
            pool_id: pool.id.clone(),
            actor,
            outcome,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
            error,
            timestamp: Utc::now(),
        }
    }
}
