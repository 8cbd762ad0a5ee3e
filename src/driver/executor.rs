//! Driver execution logic

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Semaphore};

use super::stats::{aggregate_stats, AggregatedStats, DriverStats};
use super::worker::AttemptWorker;
use super::{AttemptRecord, PoolSelector};
use crate::admission::AdmissionStrategy;
use crate::config::DriverConfig;
use crate::error::{Error, Result};
use crate::pool::Pool;

/// Everything a driver run produced
#[derive(Debug)]
pub struct DriverRun {
    /// One record per attempt, ordered by attempt index
    pub records: Vec<AttemptRecord>,

    /// Per-worker statistics
    pub worker_stats: Vec<DriverStats>,

    /// Aggregated statistics across workers
    pub stats: AggregatedStats,

    /// Wall-clock time of the whole run
    pub elapsed: Duration,
}

/// Drives admission attempts at a controlled concurrency level.
///
/// Use [`super::DriverBuilder`] to construct one.
pub struct Driver {
    pub(crate) config: DriverConfig,
    pub(crate) strategy: Arc<dyn AdmissionStrategy>,
    pub(crate) pools: Arc<Vec<Pool>>,
    pub(crate) selector: PoolSelector,
    pub(crate) shutdown_tx: broadcast::Sender<()>,
}

impl Driver {
    pub(crate) fn new(
        config: DriverConfig,
        strategy: Arc<dyn AdmissionStrategy>,
        pools: Arc<Vec<Pool>>,
        selector: PoolSelector,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            strategy,
            pools,
            selector,
            shutdown_tx,
        }
    }

    /// Trigger shutdown of all workers
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the configured attempts, honoring the configured deadline
    pub async fn run(&self) -> Result<DriverRun> {
        match self.config.deadline {
            Some(deadline) => self.run_with_deadline(deadline).await,
            None => self.run_to_completion().await,
        }
    }

    /// Run with a deadline after which unfinished attempts are surfaced as
    /// timed out instead of blocking the run indefinitely
    pub async fn run_with_deadline(&self, deadline: Duration) -> Result<DriverRun> {
        let shutdown_tx = self.shutdown_tx.clone();

        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::info!(deadline_ms = deadline.as_millis() as u64, "deadline reached, stopping run");
            let _ = shutdown_tx.send(());
        });

        let result = self.run_to_completion().await;

        timer.abort();

        result
    }

    async fn run_to_completion(&self) -> Result<DriverRun> {
        let start = Instant::now();
        let (records_tx, mut records_rx) = mpsc::channel::<AttemptRecord>(256);
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let counter = Arc::new(AtomicUsize::new(0));

        tracing::info!(
            attempts = self.config.attempts,
            workers = self.config.workers,
            pools = self.pools.len(),
            strategy = self.strategy.name(),
            "starting driver run"
        );

        let collector = tokio::spawn(async move {
            let mut records = Vec::new();
            while let Some(record) = records_rx.recv().await {
                records.push(record);
            }
            records
        });

        let mut handles = Vec::with_capacity(self.config.workers);
        for worker_id in 0..self.config.workers {
            let worker = AttemptWorker {
                id: worker_id,
                strategy: Arc::clone(&self.strategy),
                pools: Arc::clone(&self.pools),
                selector: Arc::clone(&self.selector),
                records_tx: records_tx.clone(),
                semaphore: Arc::clone(&semaphore),
                counter: Arc::clone(&counter),
                total: self.config.attempts,
            };
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(worker.run(shutdown_rx)));
        }

        // Workers hold the only remaining senders; the collector finishes
        // once they all exit.
        drop(records_tx);

        let mut worker_stats = Vec::with_capacity(handles.len());
        let mut worker_failures = 0;
        for (worker_id, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(stats) => worker_stats.push(stats),
                Err(err) => {
                    worker_failures += 1;
                    tracing::error!(worker_id, error = %err, "worker task panicked");
                }
            }
        }

        if worker_stats.is_empty() && worker_failures > 0 {
            return Err(Error::Driver(format!(
                "all {worker_failures} workers failed to complete"
            )));
        }

        let mut records = collector
            .await
            .map_err(|err| Error::Driver(format!("record collector failed: {err}")))?;

        let timed_out = self.surface_unfinished(&mut records);
        records.sort_by_key(|r| r.index);

        let elapsed = start.elapsed();
        let mut stats = aggregate_stats(&worker_stats);
        stats.timed_out += timed_out;

        tracing::info!(
            elapsed_secs = elapsed.as_secs_f64(),
            admitted = stats.admitted,
            rejected_full = stats.rejected_full,
            rejected_duplicate = stats.rejected_duplicate,
            failed = stats.failed,
            timed_out = stats.timed_out,
            aps = stats.attempts_per_second,
            "driver run completed"
        );

        Ok(DriverRun {
            records,
            worker_stats,
            stats,
            elapsed,
        })
    }

    /// Add a `TimedOut` record for every attempt index that never resolved.
    ///
    /// Returns the number of synthesized records. Zero for runs that went
    /// to completion.
    fn surface_unfinished(&self, records: &mut Vec<AttemptRecord>) -> usize {
        let mut resolved = vec![false; self.config.attempts];
        for record in records.iter() {
            if let Some(slot) = resolved.get_mut(record.index) {
                *slot = true;
            }
        }

        let mut timed_out = 0;
        for (index, resolved) in resolved.into_iter().enumerate() {
            if !resolved {
                timed_out += 1;
                let pool = &self.pools[(self.selector)(index) % self.pools.len()];
                records.push(AttemptRecord::timed_out(index, pool.id.clone()));
            }
        }
        timed_out
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("strategy", &self.strategy.name())
            .field("pools", &self.pools.len())
            .finish()
    }
}
