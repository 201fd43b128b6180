use std::sync::LazyLock;
use std::time::{Duration, Instant};

use cpu_time::ProcessTime;

use crate::pal::{CpuTimes, Platform};

/// The instant all wall clock readings are relative to.
static EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Reads the monotonic clock and the process CPU time counter.
///
/// The portable counter does not distinguish user from system time, so all of it is
/// reported as user time.
#[derive(Debug)]
pub(crate) struct BuildTargetPlatform;

pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform = BuildTargetPlatform;

impl Platform for BuildTargetPlatform {
    fn wall_time(&self) -> Duration {
        EPOCH.elapsed()
    }

    #[cfg_attr(test, mutants::skip)] // Real clock, no deterministic value to assert on.
    fn cpu_times(&self) -> CpuTimes {
        CpuTimes {
            user: ProcessTime::now().as_duration(),
            system: Duration::ZERO,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn system_time_is_not_reported() {
        assert_eq!(BUILD_TARGET_PLATFORM.cpu_times().system, Duration::ZERO);
    }
}
