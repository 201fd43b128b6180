use std::alloc::{self, Layout};
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::{NATURAL_ALIGN_CAP, Pool, PoolError, natural_alignment};

/// Overflow blocks start with this header, linking back to the block obtained before them.
#[derive(Debug)]
#[repr(C)]
struct BlockHeader {
    previous: Option<NonNull<BlockHeader>>,
    capacity: usize,
}

/// Overflow blocks are aligned to the natural cap so that the usable region after the header
/// is too, which keeps every bump within the block naturally aligned.
const BLOCK_ALIGN: usize = NATURAL_ALIGN_CAP;

const HEADER_SPAN: usize = size_of::<BlockHeader>().next_multiple_of(BLOCK_ALIGN);

/// Smallest overflow block we bother the heap for.
const MIN_BLOCK_CAPACITY: usize = 4096;

/// A growable bump allocator over a caller-supplied buffer.
///
/// Allocations are served by advancing a cursor through the current block. When the block
/// cannot fit a request, the arena obtains a new overflow block from the heap, each one
/// at least twice the size of the previous one.
///
/// [`deallocate()`][Pool::deallocate] is a no-op: space is never reused. Memory comes back
/// all at once when the arena is dropped or [released][Self::release].
///
/// # Examples
///
/// ```
/// use arena_pools::{ArenaPool, Pool};
///
/// let mut buffer = vec![0_u8; 256];
/// let arena = ArenaPool::with_buffer(&mut buffer);
///
/// let first = arena.allocate(32).unwrap();
/// let second = arena.allocate(32).unwrap();
///
/// assert_eq!(second.as_ptr() as usize - first.as_ptr() as usize, 32);
/// ```
#[derive(Debug)]
pub struct ArenaPool<'b> {
    buffer: NonNull<u8>,
    buffer_len: usize,

    /// Block we are currently bumping through: either the caller buffer or the newest
    /// overflow block.
    block_start: Cell<NonNull<u8>>,
    block_len: Cell<usize>,

    /// Offset of the next free byte in the current block.
    cursor: Cell<usize>,

    /// Newest overflow block, if any. The chain continues through the block headers.
    newest_block: Cell<Option<NonNull<BlockHeader>>>,
    next_block_capacity: Cell<usize>,

    /// Bytes obtained from the heap for overflow blocks, and the ceiling for that number.
    grown: Cell<usize>,
    growth_limit: Option<usize>,

    /// Bytes handed out (including alignment padding) over the lifetime of the arena.
    consumed: Cell<usize>,

    _buffer: PhantomData<&'b mut [u8]>,
}

impl<'b> ArenaPool<'b> {
    /// Creates an arena with no initial buffer. The first allocation obtains a block from
    /// the heap.
    #[must_use]
    pub fn new() -> Self {
        Self::from_raw_parts(NonNull::dangling(), 0)
    }

    /// Creates an arena that bumps through `buffer` before it turns to the heap.
    #[must_use]
    pub fn with_buffer(buffer: &'b mut [u8]) -> Self {
        let len = buffer.len();

        // A slice pointer is never null, even for an empty slice.
        let start = NonNull::from(buffer).cast::<u8>();

        Self::from_raw_parts(start, len)
    }

    fn from_raw_parts(buffer: NonNull<u8>, buffer_len: usize) -> Self {
        Self {
            buffer,
            buffer_len,
            block_start: Cell::new(buffer),
            block_len: Cell::new(buffer_len),
            cursor: Cell::new(0),
            newest_block: Cell::new(None),
            next_block_capacity: Cell::new(buffer_len.max(MIN_BLOCK_CAPACITY)),
            grown: Cell::new(0),
            growth_limit: None,
            consumed: Cell::new(0),
            _buffer: PhantomData,
        }
    }

    /// Caps the number of bytes the arena may obtain from the heap once the buffer is full.
    ///
    /// With a limit of zero, the arena fails as soon as the buffer is exhausted.
    #[must_use]
    pub fn with_growth_limit(mut self, bytes: usize) -> Self {
        self.growth_limit = Some(bytes);
        self
    }

    /// Bytes handed out so far, including alignment padding. Never decreases until
    /// [`release()`][Self::release].
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed.get()
    }

    /// Bytes obtained from the heap for overflow blocks.
    #[must_use]
    pub fn grown(&self) -> usize {
        self.grown.get()
    }

    /// Frees every overflow block and rewinds to the start of the caller buffer.
    ///
    /// Taking `&mut self` guarantees that no adaptor still refers to the arena.
    pub fn release(&mut self) {
        self.free_blocks();

        self.block_start.set(self.buffer);
        self.block_len.set(self.buffer_len);
        self.cursor.set(0);
        self.next_block_capacity
            .set(self.buffer_len.max(MIN_BLOCK_CAPACITY));
        self.grown.set(0);
        self.consumed.set(0);
    }

    /// Address of the next byte the arena would hand out if no padding were needed.
    pub(crate) fn next_address(&self) -> usize {
        self.block_start
            .get()
            .addr()
            .get()
            .wrapping_add(self.cursor.get())
    }

    /// Tries to carve `size` bytes aligned to `align` out of the current block.
    fn bump(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let start = self.block_start.get();
        let cursor = self.cursor.get();

        let padding = self.next_address().wrapping_neg() & (align - 1);
        let begin = cursor.checked_add(padding)?;
        let end = begin.checked_add(size)?;

        if end > self.block_len.get() {
            return None;
        }

        self.cursor.set(end);
        self.consumed
            .set(self.consumed.get().saturating_add(end - cursor));

        // SAFETY: `begin < end <= block_len`, so the result stays within the current block.
        Some(unsafe { start.add(begin) })
    }

    /// Obtains a new overflow block big enough for a request of `size` bytes.
    fn grow(&self, size: usize) -> Result<(), PoolError> {
        let fit = size
            .checked_next_power_of_two()
            .ok_or(PoolError::TooLarge { requested: size })?;
        let capacity = self.next_block_capacity.get().max(fit);

        let grown = self
            .grown
            .get()
            .checked_add(capacity)
            .ok_or(PoolError::TooLarge { requested: size })?;

        if self.growth_limit.is_some_and(|limit| grown > limit) {
            return Err(PoolError::Exhausted { requested: size });
        }

        let layout = HEADER_SPAN
            .checked_add(capacity)
            .and_then(|total| Layout::from_size_align(total, BLOCK_ALIGN).ok())
            .ok_or(PoolError::TooLarge { requested: size })?;

        // SAFETY: The layout has a non-zero size because it includes the header.
        let raw = unsafe { alloc::alloc(layout) };
        let block = NonNull::new(raw).ok_or(PoolError::Exhausted { requested: size })?;

        let header = block.cast::<BlockHeader>();

        // SAFETY: The block is freshly allocated, large enough for the header and aligned
        // to BLOCK_ALIGN which satisfies the header alignment.
        unsafe {
            header.write(BlockHeader {
                previous: self.newest_block.get(),
                capacity,
            });
        }

        self.newest_block.set(Some(header));

        // SAFETY: The block spans HEADER_SPAN + capacity bytes, so the usable region starts
        // within it.
        self.block_start.set(unsafe { block.add(HEADER_SPAN) });
        self.block_len.set(capacity);
        self.cursor.set(0);
        self.next_block_capacity.set(capacity.saturating_mul(2));
        self.grown.set(grown);

        Ok(())
    }

    fn free_blocks(&self) {
        let mut next = self.newest_block.take();

        while let Some(header) = next {
            // SAFETY: Every header in the chain was written by `grow()` and is only freed here.
            let BlockHeader { previous, capacity } = unsafe { header.read() };

            let layout = Layout::from_size_align(HEADER_SPAN + capacity, BLOCK_ALIGN)
                .expect("layout was valid when the block was allocated");

            // SAFETY: The block was allocated by `grow()` with this exact layout.
            unsafe {
                alloc::dealloc(header.as_ptr().cast(), layout);
            }

            next = previous;
        }
    }
}

impl Default for ArenaPool<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool for ArenaPool<'_> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        let align = natural_alignment(size, NATURAL_ALIGN_CAP);

        // Zero-size requests still consume a byte so that every address is distinct.
        let size = size.max(1);

        if let Some(ptr) = self.bump(size, align) {
            return Ok(ptr);
        }

        self.grow(size)?;

        Ok(self
            .bump(size, align)
            .expect("a fresh block is aligned to the cap and at least as large as the request"))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _size: usize) {}
}

impl Drop for ArenaPool<'_> {
    fn drop(&mut self) {
        self.free_blocks();
    }
}
