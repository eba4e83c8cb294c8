//! synckit: concurrency primitives demonstration driver
//!
//! Runs the resolved deadlock scenario, the resource pool and the
//! reader-writer lock with a configurable number of workers, or, on request,
//! the opposed lock order that deadlocks until the watchdog fires.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};

use synckit::cli::{Args, Scenario};
use synckit::deadlock::{self, LockOrder, ScenarioReport};
use synckit::watchdog::{run_with_watchdog, with_watchdog};
use synckit::{demo, KitError};

#[compio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet mode
    let level = if args.quiet {
        Level::ERROR
    } else {
        match args.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(args.threads)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    args.validate().context("Invalid arguments")?;
    info!("Starting synckit v{}", env!("CARGO_PKG_VERSION"));

    if args.scenario.runs_resolved_deadlock() {
        let report = run_dual_lock(&args, LockOrder::Consistent)
            .await
            .context("Resolved deadlock scenario failed")?;
        info!(
            "Consistent lock order: {} workers finished in {:?}",
            report.completed, report.elapsed
        );
    }

    if args.scenario == Scenario::Deadlock {
        warn!("Running opposed lock order; this is expected to deadlock");
        match run_dual_lock(&args, LockOrder::Opposed).await {
            Err(KitError::WatchdogExpired { limit, .. }) => {
                warn!("Circular wait reproduced: no progress within {:?}", limit);
            }
            Ok(report) => info!(
                "Opposed lock order happened not to deadlock ({:?})",
                report.elapsed
            ),
            Err(e) => return Err(e).context("Deadlock scenario failed"),
        }
    }

    if args.scenario.runs_pool() {
        let report = demo::run_pool_demo(&args.pool_config())
            .await
            .context("Resource pool demonstration failed")?;
        if report.peak_concurrency > args.capacity {
            anyhow::bail!(
                "Pool admitted {} workers at once with capacity {}",
                report.peak_concurrency,
                args.capacity
            );
        }
        info!(
            "Resource pool: {} workers done, peak {} of {}, {} slots free",
            report.completed, report.peak_concurrency, args.capacity, report.available_after
        );
    }

    if args.scenario.runs_rwlock() {
        let report = demo::run_rwlock_demo(&args.rwlock_config())
            .await
            .context("Readers-writer demonstration failed")?;
        if report.overlap_detected {
            anyhow::bail!("A reader shared the lock with the writer");
        }
        info!(
            "Readers-writer: {} reads, {} writes, final value {}",
            report.reads, report.writes, report.final_value
        );
    }

    Ok(())
}

/// Run one dual-lock scenario under the watchdog, on tasks or threads
async fn run_dual_lock(args: &Args, order: LockOrder) -> synckit::Result<ScenarioReport> {
    let config = args.scenario_config();
    let label = format!("{order:?} lock order");

    match (order, args.threads) {
        (LockOrder::Opposed, true) => run_with_watchdog(&label, args.watchdog(), move || {
            deadlock::simulate_deadlock_blocking(&config)
        })?,
        (LockOrder::Consistent, true) => run_with_watchdog(&label, args.watchdog(), move || {
            deadlock::simulate_deadlock_resolved_blocking(&config)
        })?,
        (LockOrder::Opposed, false) => {
            with_watchdog(&label, args.watchdog(), deadlock::simulate_deadlock(&config)).await?
        }
        (LockOrder::Consistent, false) => {
            let scenario = deadlock::simulate_deadlock_resolved(&config);
            with_watchdog(&label, args.watchdog(), scenario).await?
        }
    }
}
