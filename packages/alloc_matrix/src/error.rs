use std::collections::TryReserveError;
use std::io;

use allocator_api2::alloc::AllocError;
use arena_pools::PoolError;
use thiserror::Error;

/// A measured workload could not obtain the memory it asked for.
///
/// This is an expected outcome of a benchmark case (e.g. a bounded arena running dry), not a
/// harness malfunction, and is reported as a failed case rather than propagated further.
#[derive(Debug, Error)]
#[error("allocation failed inside a measured workload")]
#[non_exhaustive]
pub struct AllocationFailed;

impl From<AllocError> for AllocationFailed {
    fn from(_: AllocError) -> Self {
        Self
    }
}

impl From<allocator_api2::collections::TryReserveError> for AllocationFailed {
    fn from(_: allocator_api2::collections::TryReserveError) -> Self {
        Self
    }
}

impl From<hashbrown::TryReserveError> for AllocationFailed {
    fn from(_: hashbrown::TryReserveError) -> Self {
        Self
    }
}

impl From<PoolError> for AllocationFailed {
    fn from(_: PoolError) -> Self {
        Self
    }
}

/// Running a case in a separate process failed before an outcome could be read back.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IsolationError {
    /// The pipe carrying the result record could not be created.
    #[error("failed to create result pipe")]
    Pipe(#[source] io::Error),

    /// The worker process could not be forked.
    #[error("failed to fork worker process")]
    Fork(#[source] io::Error),

    /// Waiting for the worker process to exit failed.
    #[error("failed to wait for worker process")]
    Wait(#[source] io::Error),

    /// The result record could not be read from the worker.
    #[error("failed to read result record from worker")]
    Read(#[source] io::Error),

    /// The worker exited successfully but did not deliver a complete result record.
    #[error("worker delivered {received} bytes instead of a complete result record")]
    TruncatedRecord {
        /// Number of bytes that arrived.
        received: usize,
    },

    /// The result record carried a tag this harness does not know.
    #[error("worker delivered a result record with unknown tag {tag}")]
    UnknownTag {
        /// The tag byte that arrived.
        tag: u8,
    },

    /// The worker executable could not be started.
    #[error("failed to start worker process")]
    Spawn(#[source] io::Error),
}

/// A command-line argument failed validation.
///
/// Every variant maps to a distinct process exit code via [`exit_code()`][Self::exit_code].
/// Variants are checked in declaration order, so the first invalid argument decides the code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArgumentError {
    /// The wrong number of arguments, or an option with an invalid value.
    #[error("{message}")]
    Usage {
        /// What was wrong with the command line.
        message: String,
    },

    /// The log2 of the total element count is outside `1..=30`.
    #[error("size {value} is outside 1..=30")]
    SizeOutOfRange {
        /// The value that was given.
        value: i64,
    },

    /// The log2 of the per-container element count is outside `1..=size`.
    #[error("split {value} is outside 1..={size}")]
    SplitOutOfRange {
        /// The value that was given.
        value: i64,

        /// The size it was checked against.
        size: i64,
    },

    /// The data structure number is outside `1..=12`.
    #[error("data structure {value} is outside 1..=12")]
    ShapeOutOfRange {
        /// The value that was given.
        value: i64,
    },

    /// The allocation strategy number is outside `1..=14`.
    #[error("allocation strategy {value} is outside 1..=14")]
    StrategyOutOfRange {
        /// The value that was given.
        value: i64,
    },

    /// The reference time is negative, not finite, or zero for a non-baseline strategy.
    #[error("reference time {value} is not valid for this strategy")]
    InvalidReference {
        /// The value that was given.
        value: f64,
    },
}

impl ArgumentError {
    /// The process exit code that reports this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage { .. } => 1,
            Self::SizeOutOfRange { .. } => 2,
            Self::SplitOutOfRange { .. } => 3,
            Self::ShapeOutOfRange { .. } => 4,
            Self::StrategyOutOfRange { .. } => 5,
            Self::InvalidReference { .. } => 6,
        }
    }
}

/// The harness itself failed, as opposed to a case failing to allocate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HarnessError {
    /// The arena buffer could not be reserved up front.
    #[error("failed to reserve an arena buffer of {bytes} bytes")]
    ArenaBuffer {
        /// Requested buffer size.
        bytes: usize,

        /// Why the reservation failed.
        #[source]
        source: TryReserveError,
    },

    /// A case could not be run in or read back from a worker process.
    #[error(transparent)]
    Isolation(#[from] IsolationError),

    /// Writing results failed.
    #[error("failed to write results")]
    Output(#[from] io::Error),
}
