use std::fmt::{self, Debug};
use std::time::Duration;

#[cfg(test)]
use crate::pal::FakePlatform;
use crate::pal::{BUILD_TARGET_PLATFORM, BuildTargetPlatform, CpuTimes, Platform};

#[derive(Clone)]
pub(crate) enum PlatformFacade {
    Real(&'static BuildTargetPlatform),

    #[cfg(test)]
    Fake(FakePlatform),
}

impl PlatformFacade {
    pub(crate) fn real() -> Self {
        Self::Real(&BUILD_TARGET_PLATFORM)
    }
}

impl Platform for PlatformFacade {
    fn wall_time(&self) -> Duration {
        match self {
            Self::Real(p) => p.wall_time(),
            #[cfg(test)]
            Self::Fake(p) => p.wall_time(),
        }
    }

    fn cpu_times(&self) -> CpuTimes {
        match self {
            Self::Real(p) => p.cpu_times(),
            #[cfg(test)]
            Self::Fake(p) => p.cpu_times(),
        }
    }
}

impl From<&'static BuildTargetPlatform> for PlatformFacade {
    fn from(p: &'static BuildTargetPlatform) -> Self {
        Self::Real(p)
    }
}

#[cfg(test)]
impl From<FakePlatform> for PlatformFacade {
    fn from(p: FakePlatform) -> Self {
        Self::Fake(p)
    }
}

impl Debug for PlatformFacade {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real(p) => p.fmt(f),
            #[cfg(test)]
            Self::Fake(p) => p.fmt(f),
        }
    }
}
