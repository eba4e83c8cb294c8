//! Demonstration runs for the resource pool and the reader-writer lock
//!
//! Each run spins up workers on the compio runtime, logs what they do, and
//! returns a report with the numbers that matter for correctness.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use compio_sync::RwLock;
use tracing::info;

use crate::error::{KitError, Result};
use crate::jitter::Jitter;
use crate::pool::ResourcePool;
use crate::progress::ProgressTracker;

/// Settings for [`run_pool_demo`]
#[derive(Debug, Clone)]
pub struct PoolDemoConfig {
    /// Pool capacity
    pub capacity: usize,
    /// Workers competing for the pool
    pub workers: usize,
    /// Shortest time a worker holds its slot
    pub hold_min: Duration,
    /// Longest time a worker holds its slot
    pub hold_max: Duration,
    /// Seed for the jitter; `None` seeds from the clock
    pub seed: Option<u64>,
    /// Draw a progress bar
    pub progress: bool,
}

impl Default for PoolDemoConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            workers: 10,
            hold_min: Duration::from_millis(100),
            hold_max: Duration::from_millis(300),
            seed: None,
            progress: false,
        }
    }
}

/// What a pool run observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport {
    /// Workers that finished their work section
    pub completed: usize,
    /// Most workers seen inside the work section at once
    pub peak_concurrency: usize,
    /// Free slots once every worker was done
    pub available_after: usize,
}

/// Settings for [`run_rwlock_demo`]
#[derive(Debug, Clone)]
pub struct RwLockDemoConfig {
    /// Concurrent readers
    pub readers: usize,
    /// How long the single writer waits before asking for the lock
    pub writer_delay: Duration,
    /// Shortest read
    pub read_min: Duration,
    /// Longest read
    pub read_max: Duration,
    /// How long the writer holds the lock
    pub write_hold: Duration,
    /// Seed for the jitter; `None` seeds from the clock
    pub seed: Option<u64>,
}

impl Default for RwLockDemoConfig {
    fn default() -> Self {
        Self {
            readers: 5,
            writer_delay: Duration::from_millis(50),
            read_min: Duration::from_millis(100),
            read_max: Duration::from_millis(300),
            write_hold: Duration::from_millis(300),
            seed: None,
        }
    }
}

/// What a reader-writer run observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RwLockReport {
    /// Completed read sections
    pub reads: usize,
    /// Completed write sections
    pub writes: usize,
    /// Whether any reader shared the lock with the writer
    pub overlap_detected: bool,
    /// Value behind the lock at the end
    pub final_value: u64,
}

/// Tracks how many workers are inside a section and the most seen at once
#[derive(Default)]
struct Occupancy {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) -> usize {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        now
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

fn seeded(seed: Option<u64>) -> Jitter {
    seed.map_or_else(Jitter::from_entropy, Jitter::new)
}

/// Run `workers` workers through a pool of `capacity` slots
///
/// # Errors
///
/// Returns an error for a zero capacity or a panicking worker
pub async fn run_pool_demo(config: &PoolDemoConfig) -> Result<PoolReport> {
    let pool = ResourcePool::new(config.capacity)?;
    info!(
        capacity = config.capacity,
        workers = config.workers,
        "starting resource pool demonstration"
    );

    let occupancy = Arc::new(Occupancy::default());
    let completed = Arc::new(AtomicUsize::new(0));
    let progress = config
        .progress
        .then(|| ProgressTracker::new(config.workers as u64));
    let base = seeded(config.seed);

    let mut handles = Vec::with_capacity(config.workers);
    for id in 0..config.workers {
        let pool = pool.clone();
        let occupancy = Arc::clone(&occupancy);
        let completed = Arc::clone(&completed);
        let progress = progress.clone();
        let hold = base.fork(id).between(config.hold_min, config.hold_max);

        handles.push(compio::runtime::spawn(async move {
            pool.access_resource(id, async {
                let inside = occupancy.enter();
                info!(worker = id, inside, ?hold, "worker got the resource");
                compio::time::sleep(hold).await;
                occupancy.leave();
            })
            .await;

            info!(worker = id, "worker released the resource");
            completed.fetch_add(1, Ordering::SeqCst);
            if let Some(progress) = &progress {
                progress.worker_done();
            }
        }));
    }

    let outcomes = futures::future::join_all(handles).await;
    for (id, outcome) in outcomes.into_iter().enumerate() {
        outcome.map_err(|_| KitError::WorkerPanicked(format!("pool worker {id}")))?;
    }
    if let Some(progress) = &progress {
        progress.finish();
    }

    let report = PoolReport {
        completed: completed.load(Ordering::SeqCst),
        peak_concurrency: occupancy.peak.load(Ordering::SeqCst),
        available_after: pool.available(),
    };
    info!(?report, "resource pool demonstration finished");
    Ok(report)
}

/// Run several readers and one delayed writer over a shared counter
///
/// # Errors
///
/// Returns an error if a worker panics
pub async fn run_rwlock_demo(config: &RwLockDemoConfig) -> Result<RwLockReport> {
    info!(
        readers = config.readers,
        "starting readers-writer demonstration"
    );

    let lock = Arc::new(RwLock::new(0u64));
    let readers_inside = Arc::new(AtomicUsize::new(0));
    let writer_inside = Arc::new(AtomicBool::new(false));
    let overlap = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));
    let base = seeded(config.seed);

    let mut handles = Vec::with_capacity(config.readers + 1);
    for reader in 0..config.readers {
        let lock = Arc::clone(&lock);
        let readers_inside = Arc::clone(&readers_inside);
        let writer_inside = Arc::clone(&writer_inside);
        let overlap = Arc::clone(&overlap);
        let reads = Arc::clone(&reads);
        let duration = base.fork(reader).between(config.read_min, config.read_max);

        handles.push(compio::runtime::spawn(async move {
            let guard = lock.read().await;
            readers_inside.fetch_add(1, Ordering::SeqCst);
            if writer_inside.load(Ordering::SeqCst) {
                overlap.store(true, Ordering::SeqCst);
            }

            info!(reader, value = *guard, "reader is reading");
            compio::time::sleep(duration).await;
            info!(reader, "reader finished");

            if writer_inside.load(Ordering::SeqCst) {
                overlap.store(true, Ordering::SeqCst);
            }
            readers_inside.fetch_sub(1, Ordering::SeqCst);
            reads.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let writes = Arc::new(AtomicUsize::new(0));
    {
        let lock = Arc::clone(&lock);
        let readers_inside = Arc::clone(&readers_inside);
        let writer_inside = Arc::clone(&writer_inside);
        let overlap = Arc::clone(&overlap);
        let writes = Arc::clone(&writes);
        let delay = config.writer_delay;
        let hold = config.write_hold;

        handles.push(compio::runtime::spawn(async move {
            compio::time::sleep(delay).await;
            let mut guard = lock.write().await;
            writer_inside.store(true, Ordering::SeqCst);
            if readers_inside.load(Ordering::SeqCst) > 0 {
                overlap.store(true, Ordering::SeqCst);
            }

            info!("writer is writing");
            *guard += 1;
            compio::time::sleep(hold).await;
            info!("writer finished");

            writer_inside.store(false, Ordering::SeqCst);
            writes.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let outcomes = futures::future::join_all(handles).await;
    for (index, outcome) in outcomes.into_iter().enumerate() {
        outcome.map_err(|_| KitError::WorkerPanicked(format!("rwlock worker {index}")))?;
    }

    let final_value = *lock.read().await;
    let report = RwLockReport {
        reads: reads.load(Ordering::SeqCst),
        writes: writes.load(Ordering::SeqCst),
        overlap_detected: overlap.load(Ordering::SeqCst),
        final_value,
    };
    info!(?report, "readers-writer demonstration finished");
    Ok(report)
}
