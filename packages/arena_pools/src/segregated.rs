use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;

use crate::{Pool, PoolError};

/// Smallest size class. Every free block must be able to hold a [`FreeBlock`].
const MIN_CLASS_SIZE: usize = 8;

/// Largest size class. Bigger requests go straight to the upstream pool.
const MAX_CLASS_SIZE: usize = 4096;

const CLASS_COUNT: usize =
    (MAX_CLASS_SIZE.trailing_zeros() - MIN_CLASS_SIZE.trailing_zeros()) as usize + 1;

/// Chunks of a class start with one block and double up to this many.
const MAX_BLOCKS_PER_CHUNK: usize = 32;

/// Free blocks form an intrusive singly linked list per size class.
#[derive(Debug)]
#[repr(C)]
struct FreeBlock {
    next: Option<NonNull<FreeBlock>>,
}

/// Every chunk obtained from upstream begins with this header.
#[derive(Debug)]
#[repr(C)]
struct ChunkHeader {
    next: Option<NonNull<ChunkHeader>>,
    size: usize,
}

/// Keeps the blocks after the header aligned to the natural cap.
const CHUNK_SPAN: usize = 16;

/// Large allocations are tracked in an intrusive doubly linked list so they can be unlinked
/// individually and still released in bulk when the pool goes away.
#[derive(Debug)]
#[repr(C)]
struct LargeHeader {
    previous: Option<NonNull<LargeHeader>>,
    next: Option<NonNull<LargeHeader>>,
    size: usize,
}

const LARGE_SPAN: usize = 32;

const _: () = assert!(size_of::<FreeBlock>() <= MIN_CLASS_SIZE);
const _: () = assert!(size_of::<ChunkHeader>() <= CHUNK_SPAN);
const _: () = assert!(size_of::<LargeHeader>() <= LARGE_SPAN);

/// A pool with power-of-two size classes from 8 to 4096 bytes, each with its own free list.
///
/// Memory comes from an upstream pool in chunks. A chunk holds blocks of one size class;
/// the number of blocks per chunk starts at one and doubles with every chunk of that class,
/// up to a fixed maximum. Deallocated blocks go back onto the free list of their class and
/// are reused by the next request of that class.
///
/// Requests above the largest class are forwarded to upstream individually and returned to
/// upstream as soon as they are deallocated.
///
/// All bookkeeping lives inside the memory obtained from upstream. When the pool is dropped,
/// every chunk and large block goes back to upstream. If the pool is never dropped (e.g.
/// because it was itself placed in an arena via [`leak_in()`][crate::leak_in]), nothing
/// outside the upstream pool is leaked.
///
/// # Examples
///
/// ```
/// use arena_pools::{DefaultPool, Pool, SegregatedPool};
///
/// let pool = SegregatedPool::new(&DefaultPool);
///
/// let first = pool.allocate(24).unwrap();
/// // SAFETY: Allocated above with the same size.
/// unsafe { pool.deallocate(first, 24) };
///
/// // 24 and 32 bytes share a size class, so the block is reused.
/// let second = pool.allocate(32).unwrap();
/// assert_eq!(first, second);
/// # // SAFETY: Allocated above with the same size.
/// # unsafe { pool.deallocate(second, 32) };
/// ```
pub struct SegregatedPool<'u, U>
where
    U: Pool + ?Sized,
{
    upstream: &'u U,

    free_lists: [Cell<Option<NonNull<FreeBlock>>>; CLASS_COUNT],
    blocks_per_chunk: [Cell<usize>; CLASS_COUNT],

    chunks: Cell<Option<NonNull<ChunkHeader>>>,
    large_blocks: Cell<Option<NonNull<LargeHeader>>>,

    /// Bytes currently held from upstream, including headers.
    held: Cell<usize>,
}

impl<'u, U> SegregatedPool<'u, U>
where
    U: Pool + ?Sized,
{
    /// Creates an empty pool that will draw its memory from `upstream`.
    #[must_use]
    pub fn new(upstream: &'u U) -> Self {
        Self {
            upstream,
            free_lists: [const { Cell::new(None) }; CLASS_COUNT],
            blocks_per_chunk: [const { Cell::new(1) }; CLASS_COUNT],
            chunks: Cell::new(None),
            large_blocks: Cell::new(None),
            held: Cell::new(0),
        }
    }

    /// The pool this one draws its chunks from.
    #[must_use]
    pub fn upstream(&self) -> &'u U {
        self.upstream
    }

    /// Bytes currently held from the upstream pool, including bookkeeping headers.
    #[must_use]
    pub fn held(&self) -> usize {
        self.held.get()
    }

    /// Size class index for a small request. Empty requests are served from the 16-byte
    /// class so they receive the full natural alignment.
    fn class_of(size: usize) -> usize {
        let size = if size == 0 { 16 } else { size };

        if size <= MIN_CLASS_SIZE {
            return 0;
        }

        let bits = usize::BITS - (size - 1).leading_zeros();
        (bits - MIN_CLASS_SIZE.trailing_zeros()) as usize
    }

    fn class_size(class: usize) -> usize {
        MIN_CLASS_SIZE << class
    }

    fn pop_free(&self, class: usize) -> Option<NonNull<u8>> {
        let head = self.free_lists[class].get()?;

        // SAFETY: Everything on a free list is a block we wrote a `FreeBlock` into.
        let next = unsafe { head.read().next };
        self.free_lists[class].set(next);

        Some(head.cast())
    }

    fn push_free(&self, class: usize, block: NonNull<u8>) {
        let block = block.cast::<FreeBlock>();

        // SAFETY: The block belongs to this class, so it is at least MIN_CLASS_SIZE bytes and
        // aligned for a pointer, and nobody else uses it any more.
        unsafe {
            block.write(FreeBlock {
                next: self.free_lists[class].get(),
            });
        }

        self.free_lists[class].set(Some(block));
    }

    /// Obtains a new chunk for `class` from upstream and puts all its blocks on the free list.
    fn refill(&self, class: usize) -> Result<(), PoolError> {
        let block_size = Self::class_size(class);
        let count = self.blocks_per_chunk[class].get();

        // Cannot overflow: count and block size are both small constants.
        let size = CHUNK_SPAN + count * block_size;

        let chunk = self.upstream.allocate(size)?;
        let header = chunk.cast::<ChunkHeader>();

        // SAFETY: The size is a multiple of MIN_CLASS_SIZE, so upstream aligned the chunk for
        // the header, and the chunk is large enough to hold it.
        unsafe {
            header.write(ChunkHeader {
                next: self.chunks.get(),
                size,
            });
        }

        self.chunks.set(Some(header));
        self.held.set(self.held.get() + size);

        for index in 0..count {
            // SAFETY: Block `index` ends at CHUNK_SPAN + (index + 1) * block_size <= size.
            let block = unsafe { chunk.add(CHUNK_SPAN + index * block_size) };
            self.push_free(class, block);
        }

        self.blocks_per_chunk[class].set((count * 2).min(MAX_BLOCKS_PER_CHUNK));

        Ok(())
    }

    fn large_total(size: usize) -> Result<usize, PoolError> {
        size.checked_next_multiple_of(LARGE_SPAN)
            .and_then(|rounded| rounded.checked_add(LARGE_SPAN))
            .ok_or(PoolError::TooLarge { requested: size })
    }

    fn allocate_large(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        let total = Self::large_total(size)?;

        let block = self.upstream.allocate(total)?;
        let header = block.cast::<LargeHeader>();
        let next = self.large_blocks.get();

        // SAFETY: The total is a multiple of LARGE_SPAN, so upstream aligned the block for the
        // header, and the block is large enough to hold it.
        unsafe {
            header.write(LargeHeader {
                previous: None,
                next,
                size: total,
            });
        }

        if let Some(next) = next {
            // SAFETY: The list only contains live large blocks owned by this pool.
            unsafe {
                (*next.as_ptr()).previous = Some(header);
            }
        }

        self.large_blocks.set(Some(header));
        self.held.set(self.held.get() + total);

        // SAFETY: The block spans LARGE_SPAN + size bytes at least.
        Ok(unsafe { block.add(LARGE_SPAN) })
    }

    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate_large()` on this pool and not yet released.
    unsafe fn deallocate_large(&self, ptr: NonNull<u8>) {
        // SAFETY: Forwarded from the caller, the header sits LARGE_SPAN bytes before `ptr`.
        let header = unsafe { ptr.sub(LARGE_SPAN) }.cast::<LargeHeader>();

        // SAFETY: The header was written by `allocate_large()` and is still live.
        let LargeHeader {
            previous,
            next,
            size,
        } = unsafe { header.read() };

        match previous {
            // SAFETY: Neighbors in the list are live large blocks owned by this pool.
            Some(previous) => unsafe { (*previous.as_ptr()).next = next },
            None => self.large_blocks.set(next),
        }

        if let Some(next) = next {
            // SAFETY: Neighbors in the list are live large blocks owned by this pool.
            unsafe {
                (*next.as_ptr()).previous = previous;
            }
        }

        self.held.set(self.held.get() - size);

        // SAFETY: The block came from upstream with exactly this size.
        unsafe {
            self.upstream.deallocate(header.cast(), size);
        }
    }
}

impl<U> Pool for SegregatedPool<'_, U>
where
    U: Pool + ?Sized,
{
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        if size > MAX_CLASS_SIZE {
            return self.allocate_large(size);
        }

        let class = Self::class_of(size);

        if let Some(block) = self.pop_free(class) {
            return Ok(block);
        }

        self.refill(class)?;

        Ok(self
            .pop_free(class)
            .expect("a refill always adds at least one block"))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        if size > MAX_CLASS_SIZE {
            // SAFETY: Requests of this size were served by `allocate_large()`.
            unsafe { self.deallocate_large(ptr) };
        } else {
            self.push_free(Self::class_of(size), ptr);
        }
    }
}

impl<U> Drop for SegregatedPool<'_, U>
where
    U: Pool + ?Sized,
{
    fn drop(&mut self) {
        let mut next_chunk = self.chunks.take();

        while let Some(header) = next_chunk {
            // SAFETY: Every chunk header was written by `refill()`.
            let ChunkHeader { next, size } = unsafe { header.read() };

            // SAFETY: The chunk came from upstream with exactly this size.
            unsafe {
                self.upstream.deallocate(header.cast(), size);
            }

            next_chunk = next;
        }

        let mut next_large = self.large_blocks.take();

        while let Some(header) = next_large {
            // SAFETY: Every large header was written by `allocate_large()`.
            let LargeHeader { next, size, .. } = unsafe { header.read() };

            // SAFETY: The block came from upstream with exactly this size.
            unsafe {
                self.upstream.deallocate(header.cast(), size);
            }

            next_large = next;
        }
    }
}

impl<U> fmt::Debug for SegregatedPool<'_, U>
where
    U: Pool + ?Sized,
{
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegregatedPool")
            .field("held", &self.held.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::{ArenaPool, DefaultPool, NATURAL_ALIGN_CAP, natural_alignment};

    assert_not_impl_any!(SegregatedPool<'static, DefaultPool>: Sync);

    #[test]
    fn class_boundaries() {
        type Segregated = SegregatedPool<'static, DefaultPool>;

        assert_eq!(CLASS_COUNT, 10);
        assert_eq!(Segregated::class_of(0), 1);
        assert_eq!(Segregated::class_of(1), 0);
        assert_eq!(Segregated::class_of(8), 0);
        assert_eq!(Segregated::class_of(9), 1);
        assert_eq!(Segregated::class_of(16), 1);
        assert_eq!(Segregated::class_of(17), 2);
        assert_eq!(Segregated::class_of(4096), 9);
    }

    #[test]
    fn reuses_freed_block_of_same_class() {
        let pool = SegregatedPool::new(&DefaultPool);

        let first = pool.allocate(100).unwrap();
        // SAFETY: Allocated above with the same size.
        unsafe { pool.deallocate(first, 100) };
        let second = pool.allocate(120).unwrap();

        assert_eq!(first, second);

        // SAFETY: Allocated above with the same size.
        unsafe { pool.deallocate(second, 120) };
    }

    #[test]
    fn returns_naturally_aligned_distinct_blocks() {
        let pool = SegregatedPool::new(&DefaultPool);
        let mut live = Vec::new();

        for size in [0, 0, 1, 3, 8, 12, 16, 24, 48, 100, 512, 4096, 5000, 3] {
            let ptr = pool.allocate(size).unwrap();
            assert_eq!(
                ptr.addr().get() % natural_alignment(size, NATURAL_ALIGN_CAP),
                0,
                "size {size}"
            );

            // SAFETY: We own `size` bytes at this address.
            unsafe { ptr.as_ptr().write_bytes(0x5A, size) };

            assert!(!live.iter().any(|(other, _)| *other == ptr));
            live.push((ptr, size));
        }

        for (ptr, size) in live {
            // SAFETY: Allocated above with the same size.
            unsafe { pool.deallocate(ptr, size) };
        }
    }

    #[test]
    fn chunks_grow_geometrically() {
        let pool = SegregatedPool::new(&DefaultPool);

        // 1 + 2 + 4 blocks of the 64-byte class.
        for _ in 0..7 {
            pool.allocate(64).unwrap();
        }

        assert_eq!(pool.held(), 3 * CHUNK_SPAN + 7 * 64);
    }

    #[test]
    fn large_blocks_go_back_upstream() {
        let pool = SegregatedPool::new(&DefaultPool);

        let a = pool.allocate(10_000).unwrap();
        let b = pool.allocate(20_000).unwrap();
        let c = pool.allocate(30_000).unwrap();
        let held = pool.held();

        // Unlink from the middle, then the ends.
        // SAFETY: Allocated above with the same sizes.
        unsafe {
            pool.deallocate(b, 20_000);
        }
        assert!(pool.held() < held);

        // SAFETY: Allocated above with the same sizes.
        unsafe {
            pool.deallocate(c, 30_000);
        }
        // SAFETY: Allocated above with the same sizes.
        unsafe {
            pool.deallocate(a, 10_000);
        }

        assert_eq!(pool.held(), 0);
    }

    #[test]
    fn draws_from_arena_upstream() {
        let mut buffer = vec![0_u8; 64 * 1024];
        let range = buffer.as_ptr_range();
        let arena = ArenaPool::with_buffer(&mut buffer);

        {
            let pool = SegregatedPool::new(&arena);

            for size in [8, 40, 300, 6000] {
                let ptr = pool.allocate(size).unwrap();
                assert!(range.contains(&ptr.as_ptr().cast_const()));
            }
        }

        assert!(arena.consumed() > 6000);
    }

    #[test]
    fn upstream_failure_is_reported() {
        let mut buffer = vec![0_u8; 16];
        let arena = ArenaPool::with_buffer(&mut buffer).with_growth_limit(0);
        let pool = SegregatedPool::new(&arena);

        let result = pool.allocate(64);

        assert!(matches!(result, Err(PoolError::Exhausted { .. })));
    }
}
