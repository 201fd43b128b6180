use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::{NATURAL_ALIGN_CAP, Pool, PoolError, natural_alignment};

/// Forwards every request to the process heap.
///
/// Useful as the upstream of a [`SegregatedPool`][crate::SegregatedPool] that should not be
/// bounded by an arena, and as the reference point against which the other pools are measured.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DefaultPool;

impl DefaultPool {
    fn layout(size: usize) -> Result<Layout, PoolError> {
        Layout::from_size_align(size.max(1), natural_alignment(size, NATURAL_ALIGN_CAP))
            .map_err(|_| PoolError::TooLarge { requested: size })
    }
}

impl Pool for DefaultPool {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        let layout = Self::layout(size)?;

        // SAFETY: The layout size is at least one byte.
        let raw = unsafe { alloc::alloc(layout) };

        NonNull::new(raw).ok_or(PoolError::Exhausted { requested: size })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        // The layout was valid when the memory was allocated, so it still is.
        let Ok(layout) = Self::layout(size) else {
            return;
        };

        // SAFETY: The caller guarantees that `ptr` came from `allocate()` with this `size`,
        // which used the same layout.
        unsafe {
            alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}
