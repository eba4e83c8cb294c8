//! Permit accounting across tasks and threads

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{test_timeout_guard, ConcurrencyProbe};
use synckit::{Semaphore, SyncError};

#[compio::test]
async fn test_binary_acquire_release_cycles() {
    let sem = Semaphore::binary();

    for _ in 0..1000 {
        let permit = sem.acquire().await;
        assert_eq!(sem.available_permits(), 0);
        drop(permit);
        assert_eq!(sem.available_permits(), 1);
    }
}

#[test]
fn test_binary_blocking_cycles() {
    let sem = Semaphore::new(1).unwrap();

    for _ in 0..1000 {
        let permit = sem.acquire_blocking();
        drop(permit);
        assert_eq!(sem.available_permits(), 1);
    }
}

#[test]
fn test_no_permit_leak_under_contention() {
    let _guard = test_timeout_guard(Duration::from_secs(60));
    let sem = Semaphore::new(4).unwrap();
    let probe = ConcurrencyProbe::default();

    std::thread::scope(|scope| {
        for _ in 0..16 {
            scope.spawn(|| {
                for round in 0..50 {
                    let permit = if round % 3 == 0 {
                        match sem.try_acquire() {
                            Some(permit) => permit,
                            None => sem.acquire_blocking(),
                        }
                    } else {
                        sem.acquire_blocking()
                    };
                    assert!(probe.enter() <= 4);
                    std::thread::yield_now();
                    probe.leave();
                    drop(permit);
                }
            });
        }
    });

    assert_eq!(probe.entries(), 16 * 50);
    assert_eq!(sem.available_permits(), 4);
    assert_eq!(sem.in_use(), 0);
}

#[compio::test]
async fn test_tasks_and_threads_share_permits() {
    let _guard = test_timeout_guard(Duration::from_secs(60));
    let sem = Semaphore::new(2).unwrap();
    let probe = Arc::new(ConcurrencyProbe::default());

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let sem = sem.clone();
            let probe = Arc::clone(&probe);
            std::thread::spawn(move || {
                for _ in 0..20 {
                    let _permit = sem.acquire_blocking();
                    assert!(probe.enter() <= 2);
                    std::thread::sleep(Duration::from_millis(1));
                    probe.leave();
                }
            })
        })
        .collect();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let sem = sem.clone();
        let probe = Arc::clone(&probe);
        tasks.push(compio::runtime::spawn(async move {
            for _ in 0..20 {
                let _permit = sem.acquire().await;
                assert!(probe.enter() <= 2);
                compio::time::sleep(Duration::from_millis(1)).await;
                probe.leave();
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(probe.entries(), 160);
    assert_eq!(sem.available_permits(), 2);
}

#[test]
fn test_unmatched_release_is_reported_and_ignored() {
    let sem = Semaphore::new(2).unwrap();
    let permit = sem.try_acquire().unwrap();

    // One permit is outstanding, so a detached release is accepted once
    permit.forget();
    assert_eq!(sem.release(), Ok(()));
    assert_eq!(
        sem.release(),
        Err(SyncError::ProtocolMisuse { capacity: 2 })
    );
    assert_eq!(sem.available_permits(), 2);
}

#[compio::test]
async fn test_release_does_not_steal_a_held_permit() {
    let sem = Semaphore::binary();
    let permit = sem.acquire().await;

    assert_eq!(
        sem.release(),
        Err(SyncError::ProtocolMisuse { capacity: 1 })
    );
    assert_eq!(sem.available_permits(), 0);

    // The guard still returns its permit normally afterwards
    drop(permit);
    assert_eq!(sem.available_permits(), 1);
    let again = sem.acquire().await;
    assert_eq!(sem.in_use(), 1);
    drop(again);
}
