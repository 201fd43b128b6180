#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing the allocation strategy benchmark packages.

use std::cell::Cell;
use std::ptr::NonNull;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use arena_pools::{DefaultPool, Pool, PoolError};

/// Runs a test with a 10 second timeout to prevent infinite hangs.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog
/// is disabled and the test function is executed directly. This allows mutation
/// testing to properly detect hanging mutations.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode).
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    with_watchdog_timeout(Duration::from_secs(10), test_fn)
}

/// Same as [`with_watchdog()`] but with a caller-chosen timeout, for tests that launch child
/// processes and therefore take a while even when nothing is wrong.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode).
pub fn with_watchdog_timeout<F, R>(timeout: Duration, test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has timed out.
        drop(tx.send(result));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("Test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("Test exceeded {timeout:?} timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("Test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// Calculates the difference between two f64 values and considers
/// them equal if the difference is not more than `close_enough`.
///
/// This is a "correctly performed" floating point equality comparison.
#[must_use]
pub fn f64_diff_abs(a: f64, b: f64, close_enough: f64) -> f64 {
    let diff = (a - b).abs();

    if diff <= close_enough { 0.0 } else { diff }
}

/// A heap-backed pool that serves a fixed number of allocations and then reports exhaustion.
///
/// Used to force allocation failures at a precise point inside a workload.
#[derive(Debug)]
pub struct FailingPool {
    remaining: Cell<usize>,
}

impl FailingPool {
    /// Creates a pool that succeeds `successes` times before failing every request.
    #[must_use]
    pub fn new(successes: usize) -> Self {
        Self {
            remaining: Cell::new(successes),
        }
    }

    /// How many more allocations will succeed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.get()
    }
}

impl Pool for FailingPool {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        let remaining = self.remaining.get();

        if remaining == 0 {
            return Err(PoolError::Exhausted { requested: size });
        }

        self.remaining.set(remaining - 1);
        DefaultPool.allocate(size)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: Every allocation was forwarded to the default pool with the same size.
        unsafe { DefaultPool.deallocate(ptr, size) };
    }
}
