use std::alloc::Layout;
use std::fmt;
use std::ptr::{self, NonNull};

use allocator_api2::alloc::{AllocError, Allocator};

use crate::{Pool, PoolError};

/// A copyable reference to a [`Pool`] that container types can use as their allocator.
///
/// The adaptor never owns the pool. The borrow checker ensures that no adaptor outlives the
/// pool it refers to, and since nothing the adaptor hands out is freed by the adaptor itself,
/// dropping the pool reclaims everything at once (for pools that work that way).
///
/// # Binding
///
/// `PoolAdaptor<'p, ArenaPool<'b>>` fixes the pool type at compile time, so containers using
/// it are a distinct type per pool kind. `PoolAdaptor<'p, dyn Pool + 'p>` defers the choice to
/// run time: one container type serves every pool kind. Use [`into_dyn()`][Self::into_dyn]
/// to go from the former to the latter.
///
/// # Rebinding
///
/// Rust allocators receive a [`Layout`] with every request instead of being parameterized by
/// element type, so one adaptor value serves every element type. Nested containers share a
/// pool by receiving a copy of the outer container's adaptor.
///
/// # Equality
///
/// Two adaptors are equal if and only if they refer to the same pool instance, regardless
/// of how each one binds it.
///
/// ```
/// use arena_pools::{ArenaPool, PoolAdaptor};
///
/// let first = ArenaPool::new();
/// let second = ArenaPool::new();
///
/// let a = PoolAdaptor::new(&first);
/// let b = PoolAdaptor::new(&first).into_dyn();
/// let c = PoolAdaptor::new(&second);
///
/// assert!(a == b);
/// assert!(a != c);
/// ```
pub struct PoolAdaptor<'p, P>
where
    P: Pool + ?Sized,
{
    pool: &'p P,
}

impl<'p, P> PoolAdaptor<'p, P>
where
    P: Pool + ?Sized,
{
    /// Creates an adaptor that refers to `pool`.
    #[must_use]
    pub fn new(pool: &'p P) -> Self {
        Self { pool }
    }

    /// The pool this adaptor allocates from.
    #[must_use]
    pub fn pool(&self) -> &'p P {
        self.pool
    }

    /// Allocates uninitialized memory for `count` values of `T` from the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the array does not fit in the address space, if `T` needs a
    /// stricter alignment than the pool provides, or if the pool cannot satisfy the request.
    pub fn allocate_array<T>(&self, count: usize) -> Result<NonNull<T>, PoolError> {
        let layout = Layout::array::<T>(count).map_err(|_| PoolError::TooLarge {
            requested: count.saturating_mul(size_of::<T>()),
        })?;

        if layout.align() > self.pool.max_align() {
            return Err(PoolError::AlignmentUnsupported {
                align: layout.align(),
                max_align: self.pool.max_align(),
            });
        }

        Ok(self.pool.allocate(layout.size())?.cast())
    }

    /// Returns memory obtained from [`allocate_array()`][Self::allocate_array] to the pool.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate_array::<T>(count)` on an adaptor referring to the same
    /// pool, with the same `count`, and must not have been deallocated already.
    pub unsafe fn deallocate_array<T>(&self, ptr: NonNull<T>, count: usize) {
        // SAFETY: Forwarded from the caller. The size matches the one `allocate_array()`
        // requested because the array layout did not overflow back then either.
        unsafe {
            self.pool
                .deallocate(ptr.cast(), count.wrapping_mul(size_of::<T>()));
        }
    }
}

impl<'p, P> PoolAdaptor<'p, P>
where
    P: Pool + 'p,
{
    /// Converts a statically bound adaptor into a dynamically bound one referring to the
    /// same pool.
    #[must_use]
    pub fn into_dyn(self) -> PoolAdaptor<'p, dyn Pool + 'p> {
        PoolAdaptor { pool: self.pool }
    }
}

impl<P> Clone for PoolAdaptor<'_, P>
where
    P: Pool + ?Sized,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for PoolAdaptor<'_, P> where P: Pool + ?Sized {}

impl<P, Q> PartialEq<PoolAdaptor<'_, Q>> for PoolAdaptor<'_, P>
where
    P: Pool + ?Sized,
    Q: Pool + ?Sized,
{
    fn eq(&self, other: &PoolAdaptor<'_, Q>) -> bool {
        ptr::addr_eq(self.pool, other.pool)
    }
}

impl<P> Eq for PoolAdaptor<'_, P> where P: Pool + ?Sized {}

impl<P> fmt::Debug for PoolAdaptor<'_, P>
where
    P: Pool + ?Sized,
{
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAdaptor")
            .field("pool", &ptr::from_ref(self.pool).cast::<()>())
            .finish()
    }
}

// SAFETY: Memory handed out stays valid until it is deallocated or the pool is dropped, and
// the borrow of the pool outlives every copy of the adaptor. Copies refer to the same pool,
// so memory allocated through one copy can be deallocated through any other.
unsafe impl<P> Allocator for PoolAdaptor<'_, P>
where
    P: Pool + ?Sized,
{
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.align() > self.pool.max_align() {
            return Err(AllocError);
        }

        // Pools align by size, so the size must be a multiple of the alignment we need.
        let size = layout.pad_to_align().size();

        let ptr = self.pool.allocate(size).map_err(|_| AllocError)?;

        if size > 0 {
            // Touch the memory so the page is faulted in by the allocation, not by first use.
            // SAFETY: The pool just gave us at least `size` bytes at this address.
            unsafe {
                ptr.as_ptr().write_volatile(0);
            }
        }

        Ok(NonNull::slice_from_raw_parts(ptr, size))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: The caller guarantees `ptr` came from `allocate()` with this layout, which
        // requested exactly the padded size from the same pool.
        unsafe {
            self.pool.deallocate(ptr, layout.pad_to_align().size());
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{ArenaPool, DefaultPool, OveralignedArenaPool};

    assert_impl_all!(PoolAdaptor<'static, DefaultPool>: Copy, Send, Sync);
    assert_not_impl_any!(PoolAdaptor<'static, ArenaPool<'static>>: Send, Sync);

    /// Remembers the size of the last request it forwarded.
    #[derive(Debug, Default)]
    struct Recording {
        last_allocated: Cell<usize>,
        last_deallocated: Cell<usize>,
    }

    impl Pool for Recording {
        fn allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
            self.last_allocated.set(size);
            DefaultPool.allocate(size)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
            self.last_deallocated.set(size);
            // SAFETY: Forwarded from the caller.
            unsafe { DefaultPool.deallocate(ptr, size) };
        }
    }

    #[test]
    fn equality_tracks_pool_identity() {
        let first = ArenaPool::new();
        let second = ArenaPool::new();

        let a = PoolAdaptor::new(&first);
        let b = a;
        let c = PoolAdaptor::new(&first).into_dyn();
        let other = PoolAdaptor::new(&second);

        // Reflexive.
        assert!(PartialEq::eq(&a, &a));
        // Symmetric, across binding modes.
        assert!(a == c && c == a);
        // Transitive.
        assert!(a == b && b == c && a == c);

        assert!(a != other);
        assert!(other != c);
    }

    #[test]
    fn typed_array_forwards_element_size() {
        let pool = Recording::default();
        let adaptor = PoolAdaptor::new(&pool);

        let ptr = adaptor.allocate_array::<u64>(5).unwrap();
        assert_eq!(pool.last_allocated.get(), 40);

        // SAFETY: Allocated above with the same count.
        unsafe { adaptor.deallocate_array(ptr, 5) };
        assert_eq!(pool.last_deallocated.get(), 40);
    }

    #[test]
    fn typed_array_rejects_overaligned_elements() {
        #[repr(align(32))]
        struct Wide([u8; 32]);

        let adaptor = PoolAdaptor::new(&DefaultPool);

        let result = adaptor.allocate_array::<Wide>(2);

        assert!(matches!(
            result,
            Err(PoolError::AlignmentUnsupported {
                align: 32,
                max_align: 16
            })
        ));
    }

    #[test]
    fn allocator_rejects_alignment_above_pool_maximum() {
        let adaptor = PoolAdaptor::new(&DefaultPool);

        let layout = Layout::from_size_align(64, 64).unwrap();

        assert!(Allocator::allocate(&adaptor, layout).is_err());
    }

    #[test]
    fn allocator_accepts_alignment_up_to_overaligned_maximum() {
        let mut buffer = vec![0_u8; 4096];
        let pool = OveralignedArenaPool::new(ArenaPool::with_buffer(&mut buffer), 64);
        let adaptor = PoolAdaptor::new(&pool);

        adaptor
            .allocate(Layout::from_size_align(3, 1).unwrap())
            .unwrap();
        let ptr = adaptor
            .allocate(Layout::from_size_align(64, 64).unwrap())
            .unwrap();

        assert_eq!(ptr.cast::<u8>().addr().get() % 64, 0);
    }

    #[test]
    fn allocator_pads_size_to_alignment() {
        let pool = Recording::default();
        let adaptor = PoolAdaptor::new(&pool);

        // Hash tables ask for layouts like this one: 16-aligned, size not a multiple of 16.
        let layout = Layout::from_size_align(36, 16).unwrap();
        let ptr = adaptor.allocate(layout).unwrap();

        assert_eq!(pool.last_allocated.get(), 48);
        assert_eq!(ptr.len(), 48);
        assert_eq!(ptr.cast::<u8>().addr().get() % 16, 0);

        // SAFETY: Allocated above with the same layout.
        unsafe { adaptor.deallocate(ptr.cast(), layout) };
        assert_eq!(pool.last_deallocated.get(), 48);
    }

    #[test]
    fn allocator_touches_fresh_memory() {
        let mut buffer = vec![1_u8; 256];
        let arena = ArenaPool::with_buffer(&mut buffer);
        let adaptor = PoolAdaptor::new(&arena);

        let ptr = adaptor
            .allocate(Layout::from_size_align(8, 8).unwrap())
            .unwrap()
            .cast::<u8>();

        // SAFETY: The arena handed out 8 bytes at this address, initialized by the buffer.
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 8) };
        assert_eq!(bytes, &[0, 1, 1, 1, 1, 1, 1, 1]);
    }
}
