//! Bounded resource pool
//!
//! Caps how many callers may be inside a protected work section at once. The
//! permit is held for exactly the duration of the caller's work and is given
//! back on every exit path: normal return, an `Err` value, a panic unwinding
//! through the pool, or the async caller being cancelled.

use std::future::Future;

use compio_sync::Semaphore;
use tracing::debug;

/// Pool of `capacity` interchangeable slots for an abstract resource
#[derive(Clone, Debug)]
pub struct ResourcePool {
    semaphore: Semaphore,
}

impl ResourcePool {
    /// Create a pool allowing `capacity` concurrent accessors
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Configuration` if `capacity` is 0
    ///
    /// # Example
    ///
    /// ```rust
    /// use synckit::ResourcePool;
    ///
    /// let pool = ResourcePool::new(3).unwrap();
    /// assert_eq!(pool.capacity(), 3);
    /// assert!(ResourcePool::new(0).is_err());
    /// ```
    pub fn new(capacity: usize) -> compio_sync::Result<Self> {
        Ok(Self {
            semaphore: Semaphore::new(capacity)?,
        })
    }

    /// Run `work` while holding one slot of the pool
    ///
    /// Waits for a free slot first. The work's output, including any error it
    /// returns, is passed through unchanged.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use synckit::ResourcePool;
    ///
    /// # async fn example() -> synckit::Result<()> {
    /// let pool = ResourcePool::new(2)?;
    /// let answer = pool.access_resource(7, async { 6 * 7 }).await;
    /// assert_eq!(answer, 42);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn access_resource<F>(&self, id: usize, work: F) -> F::Output
    where
        F: Future,
    {
        debug!(worker = id, "waiting for resource");
        let _permit = self.semaphore.acquire().await;
        debug!(
            worker = id,
            in_use = self.semaphore.in_use(),
            "acquired resource"
        );
        let output = work.await;
        debug!(worker = id, "releasing resource");
        output
    }

    /// Run `work` on the current thread while holding one slot of the pool
    ///
    /// Blocks the thread until a slot is free.
    pub fn access_resource_blocking<T>(&self, id: usize, work: impl FnOnce() -> T) -> T {
        debug!(worker = id, "waiting for resource");
        let _permit = self.semaphore.acquire_blocking();
        debug!(
            worker = id,
            in_use = self.semaphore.in_use(),
            "acquired resource"
        );
        let output = work();
        debug!(worker = id, "releasing resource");
        output
    }

    /// Maximum number of concurrent accessors
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.semaphore.max_permits()
    }

    /// Slots free right now
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// The semaphore backing this pool
    #[must_use]
    pub const fn semaphore(&self) -> &Semaphore {
        &self.semaphore
    }
}
