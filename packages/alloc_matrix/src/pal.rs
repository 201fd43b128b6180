//! Platform abstraction layer for the clocks the stopwatch reads.
//!
//! Real measurements go through [`BuildTargetPlatform`], tests substitute a fake platform
//! whose clocks only move when told to.

mod abstractions;
mod facade;
#[cfg(test)]
mod fake;

#[cfg(not(unix))]
mod portable;
#[cfg(unix)]
mod unix;

pub(crate) use abstractions::{CpuTimes, Platform};
pub(crate) use facade::PlatformFacade;
#[cfg(test)]
pub(crate) use fake::FakePlatform;
#[cfg(not(unix))]
pub(crate) use portable::{BUILD_TARGET_PLATFORM, BuildTargetPlatform};
#[cfg(unix)]
pub(crate) use unix::{BUILD_TARGET_PLATFORM, BuildTargetPlatform};
