use std::cell::Cell;
use std::ptr::NonNull;

use crate::{ArenaPool, NATURAL_ALIGN_CAP, Pool, PoolError, natural_alignment};

/// An [`ArenaPool`] that honors alignments above the natural cap, up to `max_align`.
///
/// A request of `size` bytes is aligned to the lowest set bit of `size | max_align`, so a
/// 64-byte request from a pool with a `max_align` of 64 lands on a cache line boundary while
/// a 24-byte request only needs 8-byte alignment.
///
/// The pool remembers where the previous allocation ended (relative to `max_align`). When the
/// next natural allocation would be misaligned, it first burns just enough padding from the
/// arena to fix that. If the arena had to move to a new block in the meantime, the address
/// may still be off, in which case we pad and retry. Given the geometric block growth of the
/// arena this settles within two rounds.
///
/// Callers must never need an alignment above `max_align`. This is not checked on the
/// allocation path.
///
/// # Examples
///
/// ```
/// use arena_pools::{ArenaPool, OveralignedArenaPool, Pool};
///
/// let mut buffer = vec![0_u8; 4096];
/// let pool = OveralignedArenaPool::new(ArenaPool::with_buffer(&mut buffer), 64);
///
/// pool.allocate(8).unwrap();
/// let line = pool.allocate(64).unwrap();
///
/// assert_eq!(line.as_ptr() as usize % 64, 0);
/// ```
#[derive(Debug)]
pub struct OveralignedArenaPool<'b> {
    arena: ArenaPool<'b>,
    max_align: usize,

    /// Low bits (below `max_align`) of the address one past the previous allocation.
    offset: Cell<usize>,
}

impl<'b> OveralignedArenaPool<'b> {
    /// Wraps `arena`, guaranteeing alignments up to `max_align`.
    ///
    /// # Panics
    ///
    /// Panics if `max_align` is not a power of two or is below the natural cap that the
    /// arena already guarantees.
    #[must_use]
    pub fn new(arena: ArenaPool<'b>, max_align: usize) -> Self {
        assert!(
            max_align.is_power_of_two() && max_align >= NATURAL_ALIGN_CAP,
            "max_align must be a power of two no smaller than {NATURAL_ALIGN_CAP}, got {max_align}"
        );

        let offset = arena.next_address() & (max_align - 1);

        Self {
            arena,
            max_align,
            offset: Cell::new(offset),
        }
    }

    /// The underlying arena, e.g. to inspect how much it has consumed.
    #[must_use]
    pub fn arena(&self) -> &ArenaPool<'b> {
        &self.arena
    }

    /// Gives back the underlying arena.
    #[must_use]
    pub fn into_inner(self) -> ArenaPool<'b> {
        self.arena
    }

    fn allocate_tracked(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        let ptr = self.arena.allocate(size)?;

        // The arena consumes at least one byte even for an empty request.
        let end = ptr.addr().get().wrapping_add(size.max(1));
        self.offset.set(end & (self.max_align - 1));

        Ok(ptr)
    }
}

impl Pool for OveralignedArenaPool<'_> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        let alignment = natural_alignment(size, self.max_align);
        let mask = alignment - 1;

        if self.offset.get() & mask == 0 {
            let ptr = self.allocate_tracked(size)?;

            if ptr.addr().get() & mask == 0 {
                return Ok(ptr);
            }
        }

        loop {
            let pad = alignment - (self.offset.get() & mask);
            self.arena.allocate(pad)?;

            let ptr = self.allocate_tracked(size)?;

            if ptr.addr().get() & mask == 0 {
                return Ok(ptr);
            }
        }
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _size: usize) {}

    fn max_align(&self) -> usize {
        self.max_align
    }
}
