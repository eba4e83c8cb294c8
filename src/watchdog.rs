//! Wall-clock deadlines for runs that might never finish
//!
//! The primitives never time out on their own; a deadlock shows up as a
//! caller that stops making progress. These helpers are how callers notice.

use std::future::Future;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use tracing::warn;

use crate::error::{KitError, Result};

/// Await `future`, giving up after `limit`
///
/// On expiry the future is dropped, which cancels any acquire it was waiting on.
///
/// # Errors
///
/// Returns `KitError::WatchdogExpired` if the deadline passes first
pub async fn with_watchdog<F>(label: &str, limit: Duration, future: F) -> Result<F::Output>
where
    F: Future,
{
    compio::time::timeout(limit, future).await.map_err(|_| {
        warn!(label, ?limit, "watchdog expired");
        KitError::WatchdogExpired {
            label: label.to_string(),
            limit,
        }
    })
}

/// Run `work` on a helper thread, giving up after `limit`
///
/// A thread stuck in a deadlock cannot be reclaimed; on expiry it is left
/// blocked and detached.
///
/// # Errors
///
/// - `KitError::WatchdogExpired` if the deadline passes first
/// - `KitError::WorkerPanicked` if `work` panics
/// - `KitError::Io` if the helper thread cannot be spawned
pub fn run_with_watchdog<T, F>(label: &str, limit: Duration, work: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name(format!("watched-{label}"))
        .spawn(move || {
            // The receiver is gone if the watchdog already gave up
            let _ = tx.send(work());
        })?;

    match rx.recv_timeout(limit) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => {
            warn!(label, ?limit, "watchdog expired, leaving thread blocked");
            Err(KitError::WatchdogExpired {
                label: label.to_string(),
                limit,
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(KitError::WorkerPanicked(label.to_string())),
    }
}
