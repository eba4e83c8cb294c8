//! synckit: a concurrency-primitives teaching kit
//!
//! Builds a bounded resource pool and two dual-lock deadlock scenarios on top
//! of the semaphore and reader-writer lock from `compio-sync`, plus the
//! demonstration runs used by the `synckit` binary.

pub mod cli;
pub mod deadlock;
pub mod demo;
pub mod error;
pub mod jitter;
pub mod pool;
pub mod progress;
pub mod watchdog;

// Re-export commonly used types
pub use compio_sync::{LockState, RwLock, Semaphore, SemaphorePermit, SyncError};
pub use deadlock::{LockOrder, ScenarioConfig, ScenarioReport};
pub use error::{KitError, Result};
pub use pool::ResourcePool;
