//! Error types for compio-sync primitives

use thiserror::Error;

/// Result type for compio-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the synchronization primitives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A primitive was constructed with an invalid configuration
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A permit was released without a matching acquire
    #[error("release without matching acquire (semaphore already at capacity {capacity})")]
    ProtocolMisuse {
        /// Capacity of the semaphore that was over-released
        capacity: usize,
    },
}

impl SyncError {
    /// Check if error is due to invalid construction parameters
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if error is due to an unmatched release
    #[must_use]
    pub const fn is_protocol_misuse(&self) -> bool {
        matches!(self, Self::ProtocolMisuse { .. })
    }
}
