use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::pal::{CpuTimes, Platform};

#[derive(Debug, Default)]
struct FakePlatformState {
    wall_time: Duration,
    cpu_times: CpuTimes,
}

/// Clocks that only move when a test moves them.
///
/// Clones share their state, so a test can keep one clone and advance time while the code
/// under test reads from another.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakePlatform {
    state: Arc<Mutex<FakePlatformState>>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Moves every clock forward: wall time by `wall`, processor time by `user` and `system`.
    pub(crate) fn advance(&self, wall: Duration, user: Duration, system: Duration) {
        let mut state = self
            .state
            .lock()
            .expect("FakePlatform state lock should not be poisoned");

        state.wall_time += wall;
        state.cpu_times.user += user;
        state.cpu_times.system += system;
    }
}

impl Platform for FakePlatform {
    fn wall_time(&self) -> Duration {
        self.state
            .lock()
            .expect("FakePlatform state lock should not be poisoned")
            .wall_time
    }

    fn cpu_times(&self) -> CpuTimes {
        self.state
            .lock()
            .expect("FakePlatform state lock should not be poisoned")
            .cpu_times
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let platform = FakePlatform::new();

        assert_eq!(platform.wall_time(), Duration::ZERO);
        assert_eq!(platform.cpu_times(), CpuTimes::default());
    }

    #[test]
    fn clones_share_clocks() {
        let platform = FakePlatform::new();
        let clone = platform.clone();

        platform.advance(
            Duration::from_secs(2),
            Duration::from_secs(1),
            Duration::from_millis(500),
        );

        assert_eq!(clone.wall_time(), Duration::from_secs(2));
        assert_eq!(clone.cpu_times().user, Duration::from_secs(1));
        assert_eq!(clone.cpu_times().system, Duration::from_millis(500));
    }
}
