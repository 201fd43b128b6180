use std::mem;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::pal::{CpuTimes, Platform};

/// The instant all wall clock readings are relative to.
static EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Reads the monotonic clock and `getrusage()`.
#[derive(Debug)]
pub(crate) struct BuildTargetPlatform;

pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform = BuildTargetPlatform;

fn timeval_to_duration(value: libc::timeval) -> Duration {
    let seconds = u64::try_from(value.tv_sec).unwrap_or_default();
    let micros = u32::try_from(value.tv_usec).unwrap_or_default();

    Duration::new(seconds, micros.saturating_mul(1_000))
}

impl Platform for BuildTargetPlatform {
    fn wall_time(&self) -> Duration {
        EPOCH.elapsed()
    }

    #[cfg_attr(test, mutants::skip)] // Real clock, no deterministic value to assert on.
    fn cpu_times(&self) -> CpuTimes {
        // SAFETY: `rusage` is a plain C struct of integers, for which all zeroes is valid.
        let mut usage: libc::rusage = unsafe { mem::zeroed() };

        // SAFETY: `usage` is a valid, writable `rusage` for the duration of the call.
        let result = unsafe { libc::getrusage(libc::RUSAGE_SELF, &raw mut usage) };

        if result != 0 {
            warn!(
                error = %std::io::Error::last_os_error(),
                "getrusage failed, reporting zero processor time"
            );
            return CpuTimes::default();
        }

        CpuTimes {
            user: timeval_to_duration(usage.ru_utime),
            system: timeval_to_duration(usage.ru_stime),
        }
    }
}
