use std::ptr::NonNull;

use arena_pools::{ArenaPool, OveralignedArenaPool, Pool, PoolError};

/// The bump arena a strategy draws from: plain, or honoring alignments above the natural cap.
///
/// Which one is used is a harness setting, so both share this type to keep the strategy
/// matrix from doubling.
#[derive(Debug)]
pub(crate) enum MonotonicPool<'b> {
    /// Alignment capped at the natural maximum.
    Natural(ArenaPool<'b>),

    /// Alignment up to the maximum the pool was built with.
    Overaligned(OveralignedArenaPool<'b>),
}

impl<'b> MonotonicPool<'b> {
    /// Creates an arena over `buffer`.
    ///
    /// With `max_align`, the arena honors alignments up to that value. With `growth_limit`, the
    /// arena fails instead of taking more than that many bytes from the heap once the buffer
    /// is used up.
    ///
    /// # Panics
    ///
    /// Panics if `max_align` is not a power of two of at least 16.
    #[must_use]
    pub(crate) fn new(
        buffer: &'b mut [u8],
        max_align: Option<usize>,
        growth_limit: Option<usize>,
    ) -> Self {
        let mut arena = ArenaPool::with_buffer(buffer);

        if let Some(limit) = growth_limit {
            arena = arena.with_growth_limit(limit);
        }

        match max_align {
            Some(max_align) => Self::Overaligned(OveralignedArenaPool::new(arena, max_align)),
            None => Self::Natural(arena),
        }
    }

    /// The arena doing the bump allocation.
    #[cfg(test)]
    pub(crate) fn arena(&self) -> &ArenaPool<'b> {
        match self {
            Self::Natural(arena) => arena,
            Self::Overaligned(pool) => pool.arena(),
        }
    }
}

impl Pool for MonotonicPool<'_> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        match self {
            Self::Natural(arena) => arena.allocate(size),
            Self::Overaligned(pool) => pool.allocate(size),
        }
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _size: usize) {}

    fn max_align(&self) -> usize {
        match self {
            Self::Natural(arena) => arena.max_align(),
            Self::Overaligned(pool) => pool.max_align(),
        }
    }
}
