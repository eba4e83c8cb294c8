//! Async synchronization primitives for compio runtime
//!
//! This crate provides a counting semaphore and a reader-writer lock built
//! from it. Both work from [compio](https://github.com/compio-rs/compio)
//! tasks and, through their `*_blocking` methods, from plain OS threads.
//!
//! # Primitives
//!
//! - [`Semaphore`] - Counting semaphore for bounding concurrency
//! - [`RwLock`] - Many readers or one writer, composed from two binary semaphores
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_sync::{RwLock, Semaphore};
//! use std::sync::Arc;
//!
//! #[compio::main]
//! async fn main() -> compio_sync::Result<()> {
//!     let sem = Semaphore::new(3)?;
//!     let table = Arc::new(RwLock::new(Vec::new()));
//!
//!     let mut handles = Vec::new();
//!     for i in 0..10 {
//!         let sem = sem.clone();
//!         let table = Arc::clone(&table);
//!         handles.push(compio::runtime::spawn(async move {
//!             let _permit = sem.acquire().await;
//!             table.write().await.push(i);
//!         }));
//!     }
//!     for handle in handles {
//!         let _ = handle.await;
//!     }
//!     assert_eq!(table.read().await.len(), 10);
//!     Ok(())
//! }
//! ```

mod error;
mod rwlock;
mod semaphore;

pub use error::{Result, SyncError};
pub use rwlock::{LockState, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use semaphore::{Semaphore, SemaphorePermit};
