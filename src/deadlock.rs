//! Dual-lock deadlock scenarios
//!
//! Two capacity-1 semaphores and a handful of workers that each need both.
//! With [`LockOrder::Opposed`] neighbouring workers take the locks in
//! opposite order, hold the first one while pausing, and end up in a
//! circular wait: each blocks forever on the lock the other holds. That run
//! is kept as a reproducible failure mode and is only started on request.
//!
//! [`LockOrder::Consistent`] is the fix: every worker takes lock 1 before
//! lock 2 and releases in reverse order, so whoever holds lock 1 can always
//! finish and no cycle can form.

use std::time::{Duration, Instant};

use compio_sync::Semaphore;
use tracing::info;

use crate::error::{KitError, Result};
use crate::jitter::Jitter;

/// Order in which workers take the two locks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOrder {
    /// Even workers take lock 1 then lock 2, odd workers the reverse
    Opposed,
    /// Every worker takes lock 1 then lock 2
    Consistent,
}

impl LockOrder {
    /// Lock indices, in acquisition order, for worker `worker`
    #[must_use]
    pub const fn plan(self, worker: usize) -> [usize; 2] {
        match self {
            Self::Consistent => [0, 1],
            Self::Opposed if worker % 2 == 0 => [0, 1],
            Self::Opposed => [1, 0],
        }
    }
}

/// Timing and size of a scenario run
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Concurrent workers (the classic demonstration uses two)
    pub workers: usize,
    /// Pause while holding the first lock; fixed for opposed runs so the
    /// workers reliably overlap, an upper bound for jitter otherwise
    pub pause: Duration,
    /// Upper bound for the jittered time spent holding both locks
    pub hold: Duration,
    /// Seed for the jitter; `None` seeds from the clock
    pub seed: Option<u64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            pause: Duration::from_millis(100),
            hold: Duration::from_millis(100),
            seed: None,
        }
    }
}

impl ScenarioConfig {
    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(KitError::InvalidConfig(
                "scenario needs at least one worker".to_string(),
            ));
        }
        Ok(())
    }

    fn jitter(&self) -> Jitter {
        self.seed.map_or_else(Jitter::from_entropy, Jitter::new)
    }
}

/// Outcome of a scenario that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// Lock order that was used
    pub order: LockOrder,
    /// Workers that acquired both locks and released them
    pub completed: usize,
    /// Wall-clock time for the whole run
    pub elapsed: Duration,
}

/// Sleeps for one worker
struct WorkerTiming {
    pause: Duration,
    hold: Duration,
}

impl WorkerTiming {
    fn new(order: LockOrder, config: &ScenarioConfig, jitter: &mut Jitter) -> Self {
        let pause = match order {
            LockOrder::Opposed => config.pause,
            LockOrder::Consistent => jitter.between(Duration::ZERO, config.pause),
        };
        Self {
            pause,
            hold: jitter.between(Duration::ZERO, config.hold),
        }
    }
}

/// Run the opposed-order scenario on compio tasks
///
/// With two or more workers this blocks forever once each of the first two
/// workers holds its first lock. Wrap it in
/// [`with_watchdog`](crate::watchdog::with_watchdog) to observe the deadlock.
///
/// # Errors
///
/// Returns an error for an invalid configuration or a panicking worker
pub async fn simulate_deadlock(config: &ScenarioConfig) -> Result<ScenarioReport> {
    run(LockOrder::Opposed, config).await
}

/// Run the consistent-order scenario on compio tasks; always completes
///
/// # Errors
///
/// Returns an error for an invalid configuration or a panicking worker
pub async fn simulate_deadlock_resolved(config: &ScenarioConfig) -> Result<ScenarioReport> {
    run(LockOrder::Consistent, config).await
}

/// Run the opposed-order scenario on OS threads
///
/// Blocks the calling thread forever once the circular wait forms; use
/// [`run_with_watchdog`](crate::watchdog::run_with_watchdog).
///
/// # Errors
///
/// Returns an error for an invalid configuration or a panicking worker
pub fn simulate_deadlock_blocking(config: &ScenarioConfig) -> Result<ScenarioReport> {
    run_blocking(LockOrder::Opposed, config)
}

/// Run the consistent-order scenario on OS threads; always completes
///
/// # Errors
///
/// Returns an error for an invalid configuration or a panicking worker
pub fn simulate_deadlock_resolved_blocking(config: &ScenarioConfig) -> Result<ScenarioReport> {
    run_blocking(LockOrder::Consistent, config)
}

/// Run a scenario with the given lock order on compio tasks
///
/// # Errors
///
/// Returns an error for an invalid configuration or a panicking worker
pub async fn run(order: LockOrder, config: &ScenarioConfig) -> Result<ScenarioReport> {
    config.validate()?;
    info!(?order, workers = config.workers, "starting dual-lock scenario");

    let locks = [Semaphore::binary(), Semaphore::binary()];
    let base = config.jitter();
    let start = Instant::now();

    let mut handles = Vec::with_capacity(config.workers);
    for worker in 0..config.workers {
        let locks = locks.clone();
        let timing = WorkerTiming::new(order, config, &mut base.fork(worker));
        handles.push(compio::runtime::spawn(async move {
            let [first, second] = order.plan(worker);

            info!(worker, lock = first + 1, "acquiring first lock");
            let outer = locks[first].acquire().await;
            compio::time::sleep(timing.pause).await;

            info!(worker, lock = second + 1, "acquiring second lock");
            let inner = locks[second].acquire().await;
            info!(worker, "holding both locks");
            compio::time::sleep(timing.hold).await;

            drop(inner);
            drop(outer);
        }));
    }

    let outcomes = futures::future::join_all(handles).await;
    for (worker, outcome) in outcomes.into_iter().enumerate() {
        outcome.map_err(|_| KitError::WorkerPanicked(format!("scenario worker {worker}")))?;
    }

    let report = ScenarioReport {
        order,
        completed: config.workers,
        elapsed: start.elapsed(),
    };
    info!(?order, elapsed = ?report.elapsed, "dual-lock scenario finished");
    Ok(report)
}

/// Run a scenario with the given lock order on OS threads
///
/// # Errors
///
/// Returns an error for an invalid configuration or a panicking worker
pub fn run_blocking(order: LockOrder, config: &ScenarioConfig) -> Result<ScenarioReport> {
    config.validate()?;
    info!(?order, workers = config.workers, "starting dual-lock scenario on threads");

    let locks = [Semaphore::binary(), Semaphore::binary()];
    let base = config.jitter();
    let start = Instant::now();

    std::thread::scope(|scope| -> Result<()> {
        let handles: Vec<_> = (0..config.workers)
            .map(|worker| {
                let locks = &locks;
                let timing = WorkerTiming::new(order, config, &mut base.fork(worker));
                scope.spawn(move || {
                    let [first, second] = order.plan(worker);

                    info!(worker, lock = first + 1, "acquiring first lock");
                    let outer = locks[first].acquire_blocking();
                    std::thread::sleep(timing.pause);

                    info!(worker, lock = second + 1, "acquiring second lock");
                    let inner = locks[second].acquire_blocking();
                    info!(worker, "holding both locks");
                    std::thread::sleep(timing.hold);

                    drop(inner);
                    drop(outer);
                })
            })
            .collect();

        for (worker, handle) in handles.into_iter().enumerate() {
            handle
                .join()
                .map_err(|_| KitError::WorkerPanicked(format!("scenario worker {worker}")))?;
        }
        Ok(())
    })?;

    Ok(ScenarioReport {
        order,
        completed: config.workers,
        elapsed: start.elapsed(),
    })
}
