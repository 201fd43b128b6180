//! Allocator-aware element types and fallible growth helpers shared by the workloads.

use std::hash::{Hash, Hasher};
use std::hint::black_box;

use allocator_api2::alloc::Allocator;
use allocator_api2::vec::Vec;
use foldhash::fast::FixedState;
use hashbrown::HashSet;

use crate::AllocationFailed;

/// A hash set with a fixed hasher seed, so table layouts are the same in every run.
pub(crate) type FixedHashSet<T, A> = HashSet<T, FixedState, A>;

/// How many bytes of each freshly written element are overwritten to keep the write alive.
const TOUCHED_BYTES: usize = 4;

/// Creates an empty [`FixedHashSet`] that allocates from `alloc`.
#[must_use]
pub(crate) fn fixed_set_in<T, A>(alloc: A) -> FixedHashSet<T, A>
where
    A: Allocator,
{
    HashSet::with_hasher_in(FixedState::with_seed(0), alloc)
}

/// A byte string whose storage comes from the container's own allocator.
///
/// Workloads scribble over string contents after writing them, so the bytes are not
/// guaranteed to stay valid UTF-8.
#[derive(Debug)]
pub(crate) struct PoolString<A>
where
    A: Allocator,
{
    bytes: Vec<u8, A>,
}

impl<A> PoolString<A>
where
    A: Allocator,
{
    /// Copies `bytes` into a new string allocated from `alloc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocator cannot provide the storage.
    pub(crate) fn try_from_bytes_in(bytes: &[u8], alloc: A) -> Result<Self, AllocationFailed> {
        let mut storage = Vec::new_in(alloc);
        storage.try_reserve_exact(bytes.len())?;
        storage.extend_from_slice(bytes);

        Ok(Self { bytes: storage })
    }

    /// The contents of the string.
    #[must_use]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The contents of the string, for in-place modification.
    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Length in bytes.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the string has no bytes.
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl<A> PartialEq for PoolString<A>
where
    A: Allocator,
{
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<A> Eq for PoolString<A> where A: Allocator {}

impl<A> Hash for PoolString<A>
where
    A: Allocator,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

/// Cloning that reports allocation failure instead of aborting.
///
/// Every copy allocates from the allocator of the value being copied, so copies of nested
/// containers draw from the same pool as the original.
pub(crate) trait TryClone: Sized {
    /// Returns a deep copy of `self`.
    ///
    /// # Errors
    ///
    /// Returns an error if any allocation needed for the copy fails.
    fn try_clone(&self) -> Result<Self, AllocationFailed>;
}

impl TryClone for i32 {
    fn try_clone(&self) -> Result<Self, AllocationFailed> {
        Ok(*self)
    }
}

impl<A> TryClone for PoolString<A>
where
    A: Allocator + Clone,
{
    fn try_clone(&self) -> Result<Self, AllocationFailed> {
        Self::try_from_bytes_in(self.as_bytes(), self.bytes.allocator().clone())
    }
}

impl<T, A> TryClone for Vec<T, A>
where
    T: TryClone,
    A: Allocator + Clone,
{
    fn try_clone(&self) -> Result<Self, AllocationFailed> {
        let mut copy = Self::new_in(self.allocator().clone());
        copy.try_reserve_exact(self.len())?;

        for item in self {
            copy.push(item.try_clone()?);
        }

        Ok(copy)
    }
}

impl<T, A> TryClone for FixedHashSet<T, A>
where
    T: TryClone + Eq + Hash,
    A: Allocator + Clone,
{
    fn try_clone(&self) -> Result<Self, AllocationFailed> {
        let mut copy = HashSet::with_hasher_in(self.hasher().clone(), self.allocator().clone());
        copy.try_reserve(self.len())?;

        for item in self {
            copy.insert(item.try_clone()?);
        }

        Ok(copy)
    }
}

/// A value that is hashed and compared by a serial number instead of by its contents.
///
/// Hash sets of containers use this to give every inserted copy its own identity, so copies
/// with equal contents are still distinct members.
#[derive(Debug)]
pub(crate) struct Keyed<T> {
    serial: u64,
    value: T,
}

impl<T> Keyed<T> {
    /// Tags `value` with `serial`.
    #[must_use]
    pub(crate) fn new(serial: u64, value: T) -> Self {
        Self { serial, value }
    }

    /// The tagged value.
    #[must_use]
    pub(crate) fn value(&self) -> &T {
        &self.value
    }
}

impl<T> PartialEq for Keyed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl<T> Eq for Keyed<T> {}

impl<T> Hash for Keyed<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
    }
}

/// Appends `value`, growing the vector fallibly first.
///
/// # Errors
///
/// Returns an error if the vector needs to grow and its allocator cannot provide the memory.
pub(crate) fn try_push<T, A>(vec: &mut Vec<T, A>, value: T) -> Result<(), AllocationFailed>
where
    A: Allocator,
{
    vec.try_reserve(1)?;
    vec.push(value);
    Ok(())
}

/// Inserts `value`, growing the set fallibly first.
///
/// # Errors
///
/// Returns an error if the set needs to grow and its allocator cannot provide the memory.
pub(crate) fn try_insert<T, A>(
    set: &mut FixedHashSet<T, A>,
    value: T,
) -> Result<(), AllocationFailed>
where
    T: Eq + Hash,
    A: Allocator,
{
    set.try_reserve(1)?;
    set.insert(value);
    Ok(())
}

/// Overwrites the start of freshly written bytes so the write cannot be optimized away.
pub(crate) fn touch_bytes(bytes: &mut [u8]) {
    let len = bytes.len().min(TOUCHED_BYTES);
    bytes[..len].fill(0xff);
    black_box(bytes);
}

/// Overwrites a freshly written integer so the write cannot be optimized away.
pub(crate) fn touch_int(value: &mut i32) {
    *value = -1;
    black_box(value);
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::hash::BuildHasher;

    use allocator_api2::alloc::Global;
    use arena_pools::{ArenaPool, PoolAdaptor};
    use testing::FailingPool;

    use super::*;

    #[test]
    fn strings_compare_by_contents() {
        let a = PoolString::try_from_bytes_in(b"hello", Global).unwrap();
        let b = PoolString::try_from_bytes_in(b"hello", Global).unwrap();
        let c = PoolString::try_from_bytes_in(b"world", Global).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let state = FixedState::with_seed(0);
        assert_eq!(state.hash_one(&a), state.hash_one(&b));
        assert_eq!(a.len(), 5);
        assert!(!a.is_empty());
    }

    #[test]
    fn string_copies_use_the_same_pool() {
        let arena = ArenaPool::new();
        let adaptor = PoolAdaptor::new(&arena);

        let original = PoolString::try_from_bytes_in(b"abc", adaptor).unwrap();
        let copy = original.try_clone().unwrap();

        assert_eq!(copy.as_bytes(), b"abc");
        assert!(*copy.bytes.allocator() == adaptor);
    }

    #[test]
    fn nested_vector_copy_is_deep() {
        let mut inner = Vec::new_in(Global);
        inner.push(PoolString::try_from_bytes_in(b"x", Global).unwrap());
        let mut outer = Vec::new_in(Global);
        outer.push(inner);

        let mut copy = outer.try_clone().unwrap();
        copy[0][0].as_mut_bytes()[0] = b'y';

        assert_eq!(outer[0][0].as_bytes(), b"x");
        assert_eq!(copy[0][0].as_bytes(), b"y");
    }

    #[test]
    fn set_copy_keeps_members() {
        let mut set = fixed_set_in(Global);
        for value in 0..100 {
            try_insert(&mut set, value).unwrap();
        }

        let copy = set.try_clone().unwrap();

        assert_eq!(copy.len(), 100);
        assert!(copy.contains(&99));
    }

    #[test]
    fn keyed_ignores_contents() {
        let a = Keyed::new(1, 5);
        let b = Keyed::new(1, 6);
        let c = Keyed::new(2, 5);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(*c.value(), 5);
    }

    #[test]
    fn failed_copy_reports_error() {
        let pool = FailingPool::new(1);
        let adaptor = PoolAdaptor::new(&pool);

        let mut values = Vec::new_in(adaptor);
        try_push(&mut values, 1_i32).unwrap();

        assert!(values.try_clone().is_err());
    }

    #[test]
    fn touch_overwrites_prefix_only() {
        let mut bytes = [1_u8; 6];
        touch_bytes(&mut bytes);
        assert_eq!(bytes, [0xff, 0xff, 0xff, 0xff, 1, 1]);

        let mut short = [1_u8; 2];
        touch_bytes(&mut short);
        assert_eq!(short, [0xff, 0xff]);

        let mut value = 7;
        touch_int(&mut value);
        assert_eq!(value, -1);
    }
}
