use std::fmt;
use std::time::Duration;

use crate::Strategy;
use crate::pal::{CpuTimes, Platform, PlatformFacade};

/// Processor and wall clock time spent on one case.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Timings {
    system: Duration,
    user: Duration,
    wall: Duration,
}

impl Timings {
    /// Bundles already measured durations.
    #[must_use]
    pub fn new(system: Duration, user: Duration, wall: Duration) -> Self {
        Self { system, user, wall }
    }

    /// Processor time spent in the kernel on behalf of the case.
    #[must_use]
    pub fn system(&self) -> Duration {
        self.system
    }

    /// Processor time spent in user mode.
    #[must_use]
    pub fn user(&self) -> Duration {
        self.user
    }

    /// Elapsed wall clock time.
    #[must_use]
    pub fn wall(&self) -> Duration {
        self.wall
    }
}

/// Why a case produced no timings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureCause {
    /// The workload could not allocate the memory it needed.
    OutOfMemory,

    /// The isolated worker running the case died or exited unsuccessfully.
    WorkerCrashed {
        /// The raw wait status (Unix) or exit code of the worker.
        status: i32,
    },
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::WorkerCrashed { status } => write!(f, "worker crashed with status {status}"),
        }
    }
}

/// What running one case produced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaseOutcome {
    /// The case ran to completion.
    Completed(Timings),

    /// The case did not complete.
    Failed(FailureCause),
}

impl CaseOutcome {
    /// The wall clock time of a completed case, in seconds.
    #[must_use]
    pub fn wall_seconds(&self) -> Option<f64> {
        match self {
            Self::Completed(timings) => Some(timings.wall().as_secs_f64()),
            Self::Failed(_) => None,
        }
    }
}

/// How a case compares to the baseline of its binding mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Percentage {
    /// The case is the baseline itself, which is 100% by definition.
    Baseline,

    /// Wall time as a percentage of the baseline wall time.
    Relative(f64),

    /// There is no usable baseline to compare against.
    NotApplicable,

    /// The case itself failed.
    Failed,
}

impl Percentage {
    /// Relates the outcome of a case to the wall time of its baseline, in seconds.
    ///
    /// `reference` is `None` when the baseline failed or was not given. Baseline strategies
    /// ignore it.
    #[must_use]
    pub fn compute(strategy: Strategy, outcome: &CaseOutcome, reference: Option<f64>) -> Self {
        let Some(wall) = outcome.wall_seconds() else {
            return Self::Failed;
        };

        if strategy.is_baseline() {
            return Self::Baseline;
        }

        match reference {
            Some(reference) if reference > 0.0 => Self::Relative(100.0 * wall / reference),
            _ => Self::NotApplicable,
        }
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baseline => write!(f, "(100%)"),
            Self::Relative(value) => write!(f, "{value:.1}%"),
            Self::NotApplicable => write!(f, "(N/A%)"),
            Self::Failed => write!(f, "(failed%)"),
        }
    }
}

/// Captures processor and wall clock time around a piece of work.
#[derive(Debug)]
pub(crate) struct Stopwatch<'p> {
    platform: &'p PlatformFacade,
    wall_start: Duration,
    cpu_start: CpuTimes,
}

impl<'p> Stopwatch<'p> {
    pub(crate) fn start(platform: &'p PlatformFacade) -> Self {
        let cpu_start = platform.cpu_times();
        let wall_start = platform.wall_time();

        Self {
            platform,
            wall_start,
            cpu_start,
        }
    }

    pub(crate) fn stop(&self) -> Timings {
        let wall = self.platform.wall_time().saturating_sub(self.wall_start);
        let cpu = self.platform.cpu_times().since(self.cpu_start);

        Timings::new(cpu.system, cpu.user, wall)
    }
}
