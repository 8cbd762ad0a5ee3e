//! CLI argument parsing and command handling

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use crate::admission::{AdmissionStrategy, RacyAdmission, ScriptedAdmission};
use crate::bench::{BenchReport, Benchmark};
use crate::config::DriverConfig;
use crate::pool::Pool;
use crate::store::{RedisStore, RetryingStore, StoreClient};

/// Which admission design(s) to benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Optimistic check-then-act admission (the negative control)
    Racy,
    /// Atomic scripted admission
    Scripted,
    /// Both, racy first
    Both,
}

/// admit-bench - admission control benchmark over a shared store
#[derive(Parser, Debug)]
#[command(name = "admit-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Store host
    #[arg(long, default_value = "127.0.0.1", env = "STORE_HOST")]
    pub host: String,

    /// Store port
    #[arg(long, default_value = "6379", env = "STORE_PORT")]
    pub port: u16,

    /// Strategy to benchmark
    #[arg(short, long, value_enum, default_value = "both")]
    pub strategy: StrategyArg,

    /// Number of admission attempts
    #[arg(short, long, default_value = "500")]
    pub attempts: usize,

    /// Number of pools attempts are spread over
    #[arg(short, long, default_value = "2")]
    pub pools: usize,

    /// Capacity of every pool
    #[arg(short, long, default_value = "18")]
    pub capacity: u32,

    /// Concurrent worker tasks
    #[arg(short, long, default_value = "64")]
    pub workers: usize,

    /// Retry transient store failures this many times (0 disables)
    #[arg(long, default_value = "0")]
    pub retries: usize,

    /// Abort the run after this many seconds, reporting unfinished
    /// attempts as timed out
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Write the full reports as JSON to this path
    #[arg(long)]
    pub json: Option<PathBuf>,
}

impl Cli {
    /// Run the benchmark based on CLI arguments
    pub async fn run(&self) -> Result<()> {
        tracing::info!(host = %self.host, port = self.port, "connecting to store");

        let redis = RedisStore::connect(&self.host, self.port)
            .await
            .with_context(|| format!("failed to connect to store at {}:{}", self.host, self.port))?;

        let store: Arc<dyn StoreClient> = if self.retries > 0 {
            Arc::new(RetryingStore::new(
                Arc::new(redis),
                self.retries,
                Duration::from_millis(100),
            ))
        } else {
            Arc::new(redis)
        };

        let pools: Vec<Pool> = (0..self.pools)
            .map(|i| Pool::new(format!("pool-{i}"), self.capacity))
            .collect();

        let mut config = DriverConfig::new(self.attempts).with_workers(self.workers);
        if let Some(secs) = self.deadline_secs {
            config = config.with_deadline(Duration::from_secs(secs));
        }

        let benchmark = Benchmark::new(Arc::clone(&store), pools, config);

        println!();
        println!("{}", "=".repeat(70));
        println!("   admit-bench - admission under concurrency");
        println!("{}", "=".repeat(70));
        println!("  Store:       {}:{}", self.host, self.port);
        println!("  Attempts:    {}", self.attempts);
        println!("  Pools:       {} x capacity {}", self.pools, self.capacity);
        println!("  Workers:     {}", self.workers);
        println!("{}", "=".repeat(70));

        let mut reports = Vec::new();
        for strategy in self.strategies(&store) {
            let report = benchmark.run(strategy).await?;
            Self::print_report(&report);
            reports.push(report);
        }

        if let Some(path) = &self.json {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            serde_json::to_writer_pretty(file, &reports)
                .context("failed to serialize reports")?;
            println!("reports written to: {}", path.display());
        }

        Ok(())
    }

    /// Strategies to drive, racy first as in the reference benchmark
    fn strategies(&self, store: &Arc<dyn StoreClient>) -> Vec<Arc<dyn AdmissionStrategy>> {
        let racy: Arc<dyn AdmissionStrategy> = Arc::new(RacyAdmission::new(Arc::clone(store)));
        let scripted: Arc<dyn AdmissionStrategy> =
            Arc::new(ScriptedAdmission::new(Arc::clone(store)));

        match self.strategy {
            StrategyArg::Racy => vec![racy],
            StrategyArg::Scripted => vec![scripted],
            StrategyArg::Both => vec![racy, scripted],
        }
    }

    /// Print one run's results in a human-readable block
    fn print_report(report: &BenchReport) {
        println!();
        println!("{}", "-".repeat(70));
        println!("   {} admission", report.strategy);
        println!("{}", "-".repeat(70));
        println!("  Elapsed:             {:.2} ms", report.elapsed_ms);
        println!("  Attempts:            {}", report.summary.total);
        println!("  Admitted:            {}", report.summary.admitted);
        println!(
            "  Rejected (full):     {}",
            report.summary.rejected_full
        );
        println!(
            "  Rejected (dup):      {}",
            report.summary.rejected_duplicate
        );
        println!("  Failed:              {}", report.summary.failed);
        if report.summary.timed_out > 0 {
            println!("  Timed out:           {}", report.summary.timed_out);
        }
        println!();

        for pool in &report.pools {
            println!(
                "  {}: {}/{} members, full flag {}",
                pool.id, pool.occupancy, pool.capacity, pool.full_flag
            );
            println!("    members: {:?}", pool.members);
            if pool.has_overflow() {
                println!(
                    "    OVERFLOW: {} admissions beyond capacity",
                    pool.overflow
                );
            }
        }

        println!();
        if report.has_overflow() {
            println!("  result: capacity invariant VIOLATED");
        } else {
            println!("  result: capacity invariant held");
        }
    }
}
