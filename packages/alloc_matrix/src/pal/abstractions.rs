use std::fmt::Debug;
use std::time::Duration;

/// Processor time consumed by the current process, split by privilege level.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct CpuTimes {
    pub(crate) user: Duration,
    pub(crate) system: Duration,
}

impl CpuTimes {
    /// The time spent between `earlier` and `self`, clamped at zero.
    pub(crate) fn since(self, earlier: Self) -> Self {
        Self {
            user: self.user.saturating_sub(earlier.user),
            system: self.system.saturating_sub(earlier.system),
        }
    }
}

/// The clocks a stopwatch reads.
pub(crate) trait Platform: Debug {
    /// Monotonic wall clock time since an arbitrary fixed point in the process lifetime.
    fn wall_time(&self) -> Duration;

    /// Processor time the whole process has consumed so far.
    fn cpu_times(&self) -> CpuTimes;
}
