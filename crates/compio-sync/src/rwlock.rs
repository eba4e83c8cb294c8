//! Reader-writer lock composed from two binary semaphores
//!
//! Many readers may hold the lock at once; a writer holds it alone.
//!
//! - `write_token` is held while the lock is in use: by the writer, or by the
//!   first reader on behalf of every reader until the last one leaves.
//! - `read_gate` is held by a writer for its whole stay, from the moment it
//!   starts waiting. Readers pass through it on entry, so new readers queue
//!   behind a waiting writer and the Idle to Reading transition happens one
//!   reader at a time.
//! - The reader count lives behind its own short-lived mutex; it is never
//!   held across an await.
//!
//! There is no fairness guarantee beyond mutual exclusion.
//!
//! # Example
//!
//! ```rust
//! use compio_sync::RwLock;
//!
//! let lock = RwLock::new(5);
//!
//! {
//!     let r1 = lock.try_read().unwrap();
//!     let r2 = lock.try_read().unwrap();
//!     assert_eq!(*r1 + *r2, 10);
//!     assert!(lock.try_write().is_none());
//! }
//!
//! *lock.try_write().unwrap() += 1;
//! assert_eq!(*lock.try_read().unwrap(), 6);
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::semaphore::{Semaphore, SemaphorePermit};

/// Snapshot of what the lock is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Nobody holds the lock
    Idle,
    /// This many readers hold the lock
    Reading(usize),
    /// A writer holds the lock
    Writing,
}

/// Reader-writer lock protecting a value of type `T`
pub struct RwLock<T> {
    /// Writers hold this for their whole stay; readers only pass through it
    read_gate: Semaphore,
    /// Exclusive-access token shared by the active readers or owned by a writer
    write_token: Semaphore,
    readers: Mutex<ReaderState>,
    data: UnsafeCell<T>,
}

#[derive(Default)]
struct ReaderState {
    count: usize,
    /// `write_token` permit taken by the first reader, returned by the last
    shared_token: Option<SemaphorePermit>,
    writer_active: bool,
}

// SAFETY: access to `data` is mediated by the semaphore protocol above: `&mut T`
// only exists while `write_token` is owned by a writer, `&T` only while it is
// held on behalf of readers.
unsafe impl<T: Send> Send for RwLock<T> {}
// SAFETY: see above; shared readers on several threads additionally need `T: Sync`.
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Create an unlocked lock around `value`
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            read_gate: Semaphore::binary(),
            write_token: Semaphore::binary(),
            readers: Mutex::new(ReaderState::default()),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire shared access, waiting while a writer holds or awaits the lock
    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        let gate = self.read_gate.acquire().await;
        if !self.join_readers() {
            let token = self.write_token.acquire().await;
            self.become_first_reader(token);
        }
        drop(gate);
        RwLockReadGuard { lock: self }
    }

    /// Acquire shared access from an OS thread
    #[must_use]
    pub fn read_blocking(&self) -> RwLockReadGuard<'_, T> {
        futures::executor::block_on(self.read())
    }

    /// Acquire shared access if that is possible without waiting
    #[must_use]
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        let gate = self.read_gate.try_acquire()?;
        if !self.join_readers() {
            let token = self.write_token.try_acquire()?;
            self.become_first_reader(token);
        }
        drop(gate);
        Some(RwLockReadGuard { lock: self })
    }

    /// Acquire exclusive access
    ///
    /// Takes the read gate first, which stops new readers from entering, then
    /// waits for the active readers (or writer) to hand back the write token.
    pub async fn write(&self) -> RwLockWriteGuard<'_, T> {
        let gate = self.read_gate.acquire().await;
        let token = self.write_token.acquire().await;
        self.enter_writer(token, gate)
    }

    /// Acquire exclusive access from an OS thread
    #[must_use]
    pub fn write_blocking(&self) -> RwLockWriteGuard<'_, T> {
        futures::executor::block_on(self.write())
    }

    /// Acquire exclusive access if that is possible without waiting
    #[must_use]
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        let gate = self.read_gate.try_acquire()?;
        let token = self.write_token.try_acquire()?;
        Some(self.enter_writer(token, gate))
    }

    /// Current state of the lock
    ///
    /// Like `Semaphore::available_permits`, this is a snapshot for monitoring.
    #[must_use]
    pub fn state(&self) -> LockState {
        let state = self.reader_state();
        if state.count > 0 {
            LockState::Reading(state.count)
        } else if state.writer_active {
            LockState::Writing
        } else {
            LockState::Idle
        }
    }

    /// Number of readers currently holding the lock
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.reader_state().count
    }

    /// Mutable access without locking; the borrow checker proves exclusivity
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consume the lock and return the protected value
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// Count this reader in if others are already reading
    fn join_readers(&self) -> bool {
        let mut state = self.reader_state();
        if state.count > 0 {
            state.count += 1;
            trace!(readers = state.count, "reader joined");
            true
        } else {
            false
        }
    }

    fn become_first_reader(&self, token: SemaphorePermit) {
        let mut state = self.reader_state();
        debug_assert_eq!(state.count, 0, "first reader found readers already counted");
        state.count = 1;
        state.shared_token = Some(token);
        trace!("first reader took the write token");
    }

    fn enter_writer(
        &self,
        token: SemaphorePermit,
        gate: SemaphorePermit,
    ) -> RwLockWriteGuard<'_, T> {
        self.reader_state().writer_active = true;
        trace!("writer entered");
        RwLockWriteGuard {
            lock: self,
            token: Some(token),
            gate: Some(gate),
        }
    }

    fn reader_state(&self) -> MutexGuard<'_, ReaderState> {
        // Only counters are touched under this lock, nothing that can panic
        self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RwLock")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Shared access to the value behind an [`RwLock`]
///
/// Dropping the last outstanding read guard hands the write token back.
#[must_use = "the read lock is released immediately if the guard is not held"]
pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: while any read guard exists the write token is held on behalf
        // of readers, so no write guard can exist.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        let token = {
            let mut state = self.lock.reader_state();
            state.count -= 1;
            trace!(readers = state.count, "reader left");
            if state.count == 0 {
                state.shared_token.take()
            } else {
                None
            }
        };
        // Released outside the reader mutex
        drop(token);
    }
}

/// Exclusive access to the value behind an [`RwLock`]
///
/// On drop the write token is released first, then the read gate.
#[must_use = "the write lock is released immediately if the guard is not held"]
pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
    token: Option<SemaphorePermit>,
    gate: Option<SemaphorePermit>,
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard owns the write token
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: this guard owns the write token, and `&mut self` makes the borrow unique
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.reader_state().writer_active = false;
        drop(self.token.take());
        drop(self.gate.take());
        trace!("writer left");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_state_transitions() {
        let lock = RwLock::new(());
        assert_eq!(lock.state(), LockState::Idle);

        let r1 = lock.try_read().unwrap();
        assert_eq!(lock.state(), LockState::Reading(1));
        let r2 = lock.try_read().unwrap();
        assert_eq!(lock.state(), LockState::Reading(2));

        drop(r1);
        assert_eq!(lock.state(), LockState::Reading(1));
        drop(r2);
        assert_eq!(lock.state(), LockState::Idle);

        let w = lock.try_write().unwrap();
        assert_eq!(lock.state(), LockState::Writing);
        drop(w);
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[test]
    fn test_writer_excludes_everyone() {
        let lock = RwLock::new(0);
        let writer = lock.try_write().unwrap();

        assert!(lock.try_read().is_none());
        assert!(lock.try_write().is_none());

        drop(writer);
        assert!(lock.try_read().is_some());
    }

    #[test]
    fn test_readers_exclude_writer() {
        let lock = RwLock::new(0);
        let reader = lock.try_read().unwrap();

        assert!(lock.try_write().is_none());
        // A failed try_write must not leave the gate closed
        assert!(lock.try_read().is_some());

        drop(reader);
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn test_write_then_read_value() {
        let mut lock = RwLock::new(vec![1, 2]);
        lock.try_write().unwrap().push(3);
        assert_eq!(*lock.try_read().unwrap(), vec![1, 2, 3]);

        lock.get_mut().push(4);
        assert_eq!(lock.into_inner(), vec![1, 2, 3, 4]);
    }

    #[compio::test]
    async fn test_writer_waits_for_readers() {
        let lock = Arc::new(RwLock::new(0u32));
        let reader = lock.read().await;

        let lock2 = Arc::clone(&lock);
        let writer = compio::runtime::spawn(async move {
            let mut guard = lock2.write().await;
            *guard += 1;
        });

        compio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*reader, 0);
        assert_eq!(lock.state(), LockState::Reading(1));

        drop(reader);
        writer.await.unwrap();
        assert_eq!(*lock.read().await, 1);
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[compio::test]
    async fn test_waiting_writer_blocks_new_readers() {
        let lock = Arc::new(RwLock::new(()));
        let reader = lock.read().await;

        let lock2 = Arc::clone(&lock);
        let writer = compio::runtime::spawn(async move {
            let _guard = lock2.write().await;
            compio::time::sleep(Duration::from_millis(10)).await;
        });
        compio::time::sleep(Duration::from_millis(20)).await;

        // The writer holds the read gate while it waits
        assert!(lock.try_read().is_none());
        assert_eq!(lock.reader_count(), 1);

        drop(reader);
        writer.await.unwrap();
        assert!(lock.try_read().is_some());
    }

    #[compio::test]
    async fn test_cancelled_writer_releases_gate() {
        let lock = RwLock::new(());
        let reader = lock.read().await;

        let mut pending = Box::pin(lock.write());
        assert!(futures::poll!(pending.as_mut()).is_pending());
        assert!(lock.try_read().is_none());

        drop(pending);
        assert!(lock.try_read().is_some());
        drop(reader);
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[test]
    fn test_blocking_writers_across_threads() {
        let lock = RwLock::new(0usize);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..250 {
                        *lock.write_blocking() += 1;
                    }
                });
            }
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        let value = *lock.read_blocking();
                        assert!(value <= 1000);
                    }
                });
            }
        });

        assert_eq!(*lock.read_blocking(), 1000);
        assert_eq!(lock.state(), LockState::Idle);
    }
}
