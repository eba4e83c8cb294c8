//! Error handling and types

use std::time::Duration;

use thiserror::Error;

/// Errors from the pool, the scenarios and the demonstrations
#[derive(Error, Debug)]
pub enum KitError {
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by a synchronization primitive
    #[error(transparent)]
    Sync(#[from] compio_sync::SyncError),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A run did not finish before its wall-clock deadline
    #[error("{label} did not finish within {limit:?} (possible deadlock)")]
    WatchdogExpired {
        /// What was being watched
        label: String,
        /// Deadline that expired
        limit: Duration,
    },

    /// A worker task or thread panicked
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}

impl KitError {
    /// Check if error is an expired watchdog
    #[must_use]
    pub const fn is_watchdog_expired(&self) -> bool {
        matches!(self, Self::WatchdogExpired { .. })
    }
}

pub type Result<T> = std::result::Result<T, KitError>;
