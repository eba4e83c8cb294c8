//! Counting semaphore for compio tasks and OS threads
//!
//! A fixed number of permits is handed out to callers; when none are left,
//! `acquire()` suspends the task (or `acquire_blocking()` parks the thread)
//! until a permit is returned. Returning a permit wakes at most one waiter.
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_sync::Semaphore;
//!
//! # async fn example() -> compio_sync::Result<()> {
//! let semaphore = Semaphore::new(3)?;
//!
//! // Acquire permit before starting work
//! let permit = semaphore.acquire().await;
//!
//! // Do work while holding permit
//! // ...
//!
//! // Permit released when dropped
//! drop(permit);
//! assert_eq!(semaphore.available_permits(), 3);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use tracing::{trace, warn};

use crate::error::{Result, SyncError};

/// A counting semaphore usable from compio tasks and from plain threads
///
/// # Design
///
/// - **Lock-free fast path**: `try_acquire` is a CAS loop on the permit counter
/// - **Queued waiters**: blocked acquirers are woken roughly in arrival order,
///   without a strict fairness guarantee (a caller on the fast path may overtake)
/// - **RAII permits**: `SemaphorePermit` releases on drop, on every exit path
/// - **Bounded**: the permit count never rises above the configured capacity
/// - **Cloneable**: clones share one permit store
///
/// # Example
///
/// ```rust,no_run
/// use compio_sync::Semaphore;
///
/// # async fn example() -> compio_sync::Result<()> {
/// let sem = Semaphore::new(2)?;
///
/// let mut handles = Vec::new();
/// for i in 0..10 {
///     let sem = sem.clone();
///     handles.push(compio::runtime::spawn(async move {
///         let _permit = sem.acquire().await;
///         // At most 2 tasks are here at once
///         println!("Processing {}", i);
///     }));
/// }
/// for handle in handles {
///     let _ = handle.await;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Semaphore {
    /// Shared state between all clones of this semaphore
    inner: Arc<SemaphoreInner>,
}

struct SemaphoreInner {
    /// Available permits
    permits: AtomicUsize,
    /// Capacity fixed at construction
    max_permits: usize,
    /// Permits detached with `forget` and not yet given back by `release`
    detached: AtomicUsize,
    /// Tasks and threads waiting for a permit
    waiters: Mutex<WaitQueue>,
}

/// Queue of parked acquirers, keyed so a cancelled acquirer can leave it
#[derive(Default)]
struct WaitQueue {
    entries: VecDeque<(u64, Waker)>,
    next_id: u64,
}

impl WaitQueue {
    fn push(&mut self, waker: Waker) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push_back((id, waker));
        id
    }

    /// Refresh the waker of a queued entry, or re-queue it if it was already woken
    fn register(&mut self, id: u64, waker: &Waker) {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(entry, _)| *entry == id) {
            if !existing.will_wake(waker) {
                *existing = waker.clone();
            }
        } else {
            self.entries.push_back((id, waker.clone()));
        }
    }

    /// Returns false if the entry had already been popped by a release
    fn remove(&mut self, id: u64) -> bool {
        match self.entries.iter().position(|(entry, _)| *entry == id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    fn pop_front(&mut self) -> Option<Waker> {
        self.entries.pop_front().map(|(_, waker)| waker)
    }
}

impl Semaphore {
    /// Create a new semaphore with the given number of permits
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Configuration` if `permits` is 0
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(1024).unwrap();
    /// assert_eq!(sem.available_permits(), 1024);
    /// assert!(Semaphore::new(0).is_err());
    /// ```
    pub fn new(permits: usize) -> Result<Self> {
        if permits == 0 {
            return Err(SyncError::Configuration(
                "semaphore must have at least one permit".to_string(),
            ));
        }
        Ok(Self::with_capacity(permits))
    }

    /// Create a semaphore with a single permit
    #[must_use]
    pub fn binary() -> Self {
        Self::with_capacity(1)
    }

    fn with_capacity(permits: usize) -> Self {
        Self {
            inner: Arc::new(SemaphoreInner {
                permits: AtomicUsize::new(permits),
                max_permits: permits,
                detached: AtomicUsize::new(0),
                waiters: Mutex::new(WaitQueue::default()),
            }),
        }
    }

    /// Acquire a permit, waiting asynchronously if none are available
    ///
    /// Returns a `SemaphorePermit` that releases the permit when dropped.
    /// Dropping the returned future before it resolves removes the caller
    /// from the wait queue without consuming a permit.
    pub async fn acquire(&self) -> SemaphorePermit {
        AcquireFuture {
            semaphore: self.clone(),
            waiter_id: None,
        }
        .await
    }

    /// Acquire a permit, parking the current thread until one is available
    ///
    /// Meant for OS threads. Calling this from inside a compio task blocks
    /// that task's whole runtime thread.
    #[must_use]
    pub fn acquire_blocking(&self) -> SemaphorePermit {
        futures::executor::block_on(self.acquire())
    }

    /// Try to acquire a permit without waiting
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_sync::Semaphore;
    ///
    /// let sem = Semaphore::binary();
    ///
    /// let permit1 = sem.try_acquire();
    /// assert!(permit1.is_some());
    ///
    /// let permit2 = sem.try_acquire();
    /// assert!(permit2.is_none());  // No permits left
    /// ```
    #[must_use]
    pub fn try_acquire(&self) -> Option<SemaphorePermit> {
        let mut current = self.inner.permits.load(Ordering::Acquire);

        loop {
            if current == 0 {
                return None;
            }

            match self.inner.permits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(SemaphorePermit {
                        semaphore: self.clone(),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Return one permit that was detached with [`SemaphorePermit::forget`]
    ///
    /// Wakes at most one waiter. Only forgotten permits can be returned this
    /// way; a permit still held by a guard goes back when the guard drops.
    /// On misuse the permit count is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ProtocolMisuse` when no forgotten permit is
    /// outstanding.
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_sync::Semaphore;
    ///
    /// let sem = Semaphore::binary();
    /// sem.try_acquire().unwrap().forget();
    /// assert_eq!(sem.available_permits(), 0);
    ///
    /// sem.release().unwrap();
    /// assert_eq!(sem.available_permits(), 1);
    ///
    /// // Nothing left to return
    /// assert!(sem.release().is_err());
    /// assert_eq!(sem.available_permits(), 1);
    /// ```
    pub fn release(&self) -> Result<()> {
        let claimed = self
            .inner
            .detached
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();

        if claimed && self.release_permit() {
            Ok(())
        } else {
            warn!(
                capacity = self.inner.max_permits,
                "release without matching acquire ignored"
            );
            Err(SyncError::ProtocolMisuse {
                capacity: self.inner.max_permits,
            })
        }
    }

    /// Get the number of available permits
    ///
    /// Useful for monitoring; the value may change immediately after reading.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.inner.permits.load(Ordering::Acquire)
    }

    /// Get the maximum number of permits (configured capacity)
    #[must_use]
    pub fn max_permits(&self) -> usize {
        self.inner.max_permits
    }

    /// Get the number of permits currently in use (max - available)
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(100).unwrap();
    /// let _permit = sem.try_acquire().unwrap();
    /// assert_eq!(sem.in_use(), 1);
    /// ```
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.inner.max_permits - self.available_permits()
    }

    /// Increment the permit count unless already at capacity, then wake one waiter
    fn release_permit(&self) -> bool {
        let mut current = self.inner.permits.load(Ordering::Acquire);

        loop {
            if current >= self.inner.max_permits {
                return false;
            }

            match self.inner.permits.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let next = self.lock_waiters().pop_front();
        if let Some(waker) = next {
            trace!("permit released, waking one waiter");
            waker.wake();
        }
        true
    }

    fn lock_waiters(&self) -> MutexGuard<'_, WaitQueue> {
        // No code panics while holding this lock, so a poisoned queue is still consistent
        self.inner
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn queued_waiters(&self) -> usize {
        self.lock_waiters().entries.len()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("available", &self.available_permits())
            .field("capacity", &self.inner.max_permits)
            .finish()
    }
}

/// RAII guard that releases a semaphore permit on drop
///
/// Returned by `acquire()`, `acquire_blocking()` and `try_acquire()`. When
/// dropped, the permit goes back to the semaphore and one waiting task or
/// thread (if any) is woken.
#[must_use = "permit is released immediately if not held"]
pub struct SemaphorePermit {
    /// Semaphore that issued this permit
    semaphore: Semaphore,
}

impl SemaphorePermit {
    /// Detach the permit without returning it
    ///
    /// The permit stays outstanding until a matching [`Semaphore::release`].
    pub fn forget(self) {
        self.semaphore
            .inner
            .detached
            .fetch_add(1, Ordering::AcqRel);
        std::mem::forget(self);
    }
}

impl fmt::Debug for SemaphorePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemaphorePermit")
            .field("semaphore", &self.semaphore)
            .finish()
    }
}

impl Drop for SemaphorePermit {
    fn drop(&mut self) {
        // May run during an unwind, so a full semaphore is logged, not asserted
        if !self.semaphore.release_permit() {
            warn!(
                capacity = self.semaphore.inner.max_permits,
                "permit returned to a full semaphore ignored"
            );
        }
    }
}

/// Future that resolves when a semaphore permit is acquired
///
/// Each poll, under the wait-queue lock:
/// 1. Try to take a permit; on success leave the queue
/// 2. Otherwise register (or refresh) this acquirer's waker and return `Poll::Pending`
///
/// Doing both under the lock means a release either sees the registered waker
/// or happened early enough for the permit to be taken here.
struct AcquireFuture {
    semaphore: Semaphore,
    /// Queue entry, present once this future has been parked
    waiter_id: Option<u64>,
}

impl Future for AcquireFuture {
    type Output = SemaphorePermit;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut waiters = this.semaphore.lock_waiters();

        if let Some(permit) = this.semaphore.try_acquire() {
            if let Some(id) = this.waiter_id.take() {
                waiters.remove(id);
            }
            return Poll::Ready(permit);
        }

        match this.waiter_id {
            Some(id) => waiters.register(id, cx.waker()),
            None => this.waiter_id = Some(waiters.push(cx.waker().clone())),
        }
        Poll::Pending
    }
}

impl Drop for AcquireFuture {
    fn drop(&mut self) {
        let Some(id) = self.waiter_id.take() else {
            return;
        };

        let next = {
            let mut waiters = self.semaphore.lock_waiters();
            let still_queued = waiters.remove(id);
            // Popped by a release but never took the permit: hand the wakeup on
            if !still_queued && self.semaphore.available_permits() > 0 {
                waiters.pop_front()
            } else {
                None
            }
        };
        if let Some(waker) = next {
            waker.wake();
        }
    }
}
