use std::alloc::Layout;
use std::ptr::NonNull;

use thiserror::Error;

/// The largest alignment any pool guarantees without being asked for more.
///
/// This matches the largest fundamental alignment on the targets we care about.
pub const NATURAL_ALIGN_CAP: usize = 16;

/// Errors that can occur when a pool is asked for memory.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The pool (or the heap behind it) could not provide the requested bytes.
    #[error("pool exhausted while allocating {requested} bytes")]
    Exhausted {
        /// Size of the request that could not be satisfied.
        requested: usize,
    },

    /// The request, once padded or prefixed with bookkeeping, does not fit in `usize`.
    #[error("allocation of {requested} bytes overflows the address space")]
    TooLarge {
        /// Size of the request that could not be satisfied.
        requested: usize,
    },

    /// The caller needs a stricter alignment than the pool can guarantee.
    #[error("alignment {align} exceeds the pool maximum of {max_align}")]
    AlignmentUnsupported {
        /// Alignment that was asked for.
        align: usize,

        /// Largest alignment the pool guarantees.
        max_align: usize,
    },
}

/// A source of raw memory that serves size-only requests.
///
/// Implementations return memory aligned to [`natural_alignment(size, self.max_align())`][
/// natural_alignment]. A request for zero bytes still yields a valid, correctly aligned
/// address that does not collide with any other live allocation.
///
/// Pools use interior mutability: every operation takes `&self` so that any number of
/// [`PoolAdaptor`][crate::PoolAdaptor] copies can share one pool.
pub trait Pool {
    /// Allocates `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot provide the memory.
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError>;

    /// Returns memory to the pool. Pools without per-allocation reclamation ignore this.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate()`][Self::allocate] on this same pool with
    /// the same `size`, and must not have been deallocated already.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize);

    /// The largest alignment this pool guarantees.
    fn max_align(&self) -> usize {
        NATURAL_ALIGN_CAP
    }
}

/// Returns the alignment that a request of `size` bytes receives from a pool whose maximum
/// alignment is `cap`: the largest power of two dividing `size`, capped at `cap`.
///
/// `cap` must be a power of two.
///
/// # Examples
///
/// ```
/// use arena_pools::natural_alignment;
///
/// assert_eq!(natural_alignment(24, 16), 8);
/// assert_eq!(natural_alignment(96, 64), 32);
/// assert_eq!(natural_alignment(0, 64), 64);
/// ```
#[must_use]
#[inline]
pub const fn natural_alignment(size: usize, cap: usize) -> usize {
    debug_assert!(cap.is_power_of_two());

    let bits = size | cap;
    // Clears all but the lowest set bit.
    bits & bits.wrapping_neg()
}

/// Moves `value` into memory obtained from `pool` and hands back a reference that lives as
/// long as the pool borrow.
///
/// The value is never dropped. Its memory is reclaimed only when the pool itself releases
/// everything it owns, which is the point: the whole structure is abandoned with the pool.
///
/// # Errors
///
/// Returns an error if the pool cannot provide memory for `T` or cannot align it.
pub fn leak_in<P, T>(pool: &P, value: T) -> Result<&mut T, PoolError>
where
    P: Pool + ?Sized,
{
    let layout = Layout::new::<T>();

    if layout.align() > pool.max_align() {
        return Err(PoolError::AlignmentUnsupported {
            align: layout.align(),
            max_align: pool.max_align(),
        });
    }

    let ptr = pool.allocate(layout.size())?.cast::<T>();

    // SAFETY: The pool returned at least `size_of::<T>()` bytes with natural alignment, which
    // satisfies `align_of::<T>()` because the size of a type is a multiple of its alignment
    // and we checked that the alignment does not exceed the pool cap.
    unsafe {
        ptr.as_ptr().write(value);
    }

    // SAFETY: Just initialized above. The memory is exclusively ours until the pool goes away,
    // which the borrow of `pool` prevents for the lifetime of the returned reference.
    Ok(unsafe { &mut *ptr.as_ptr() })
}
