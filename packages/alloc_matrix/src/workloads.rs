//! The twelve units of work, one per [`Shape`][crate::Shape].
//!
//! Every workload builds its elements from the container's own allocator, so nested
//! containers draw from the same pool as the container holding them.

use std::iter;
use std::ops::RangeInclusive;

use allocator_api2::alloc::Allocator;
use allocator_api2::vec::Vec;

use crate::containers::{
    FixedHashSet, Keyed, PoolString, TryClone, fixed_set_in, touch_bytes, touch_int, try_insert,
    try_push,
};
use crate::{AllocationFailed, DataContext};

/// Lengths of the strings stored by the flat string shapes.
const TEXT_LENGTHS: RangeInclusive<usize> = 33..=1000;

/// Elements in the first inner container of every nested shape.
const INNER_LEN: usize = 128;

/// A unit of work that fills one container of a particular shape.
///
/// The container type is generic over its allocator so the same workload runs under every
/// pool chain and binding mode.
pub(crate) trait Workload {
    /// The outermost container this workload fills.
    type Container<A: Allocator + Clone>;

    /// Creates an empty container that allocates from `alloc`.
    fn create<A: Allocator + Clone>(alloc: A) -> Self::Container<A>;

    /// Reserves room for `elements` and then fills the container.
    ///
    /// # Errors
    ///
    /// Returns an error if any allocation fails. The container is left partially filled.
    fn populate<A: Allocator + Clone>(
        container: &mut Self::Container<A>,
        elements: usize,
        data: &mut DataContext,
    ) -> Result<(), AllocationFailed>;
}

/// Declares a unit struct implementing [`Workload`] for one container type.
macro_rules! workload {
    (
        $(#[$attr:meta])*
        $name:ident: $container:ty = $create:path;
        |$container_arg:ident, $elements:ident, $data:ident| $populate:expr
    ) => {
        $(#[$attr])*
        #[derive(Debug)]
        pub(crate) struct $name;

        impl Workload for $name {
            type Container<A: Allocator + Clone> = $container;

            fn create<A: Allocator + Clone>(alloc: A) -> Self::Container<A> {
                $create(alloc)
            }

            fn populate<A: Allocator + Clone>(
                $container_arg: &mut Self::Container<A>,
                $elements: usize,
                $data: &mut DataContext,
            ) -> Result<(), AllocationFailed> {
                $populate
            }
        }
    };
}

fn random_string<A>(alloc: A, data: &mut DataContext) -> Result<PoolString<A>, AllocationFailed>
where
    A: Allocator,
{
    PoolString::try_from_bytes_in(data.random_text(TEXT_LENGTHS).as_bytes(), alloc)
}

fn ones<A>(alloc: A, _data: &mut DataContext) -> Result<Vec<i32, A>, AllocationFailed>
where
    A: Allocator,
{
    let mut values = Vec::new_in(alloc);
    values.try_reserve_exact(INNER_LEN)?;
    values.extend(iter::repeat_n(1, INNER_LEN));
    Ok(values)
}

fn random_ints<A>(alloc: A, data: &mut DataContext) -> Result<Vec<i32, A>, AllocationFailed>
where
    A: Allocator,
{
    let mut values = Vec::new_in(alloc);
    values.try_reserve_exact(INNER_LEN)?;
    values.extend(iter::repeat_with(|| data.random_int()).take(INNER_LEN));
    Ok(values)
}

fn random_strings<A>(
    alloc: A,
    data: &mut DataContext,
) -> Result<Vec<PoolString<A>, A>, AllocationFailed>
where
    A: Allocator + Clone,
{
    let mut values = Vec::new_in(alloc);
    values.try_reserve_exact(INNER_LEN)?;

    for _ in 0..INNER_LEN {
        let text = random_string(values.allocator().clone(), data)?;
        values.push(text);
    }

    Ok(values)
}

fn random_int_set<A>(
    alloc: A,
    data: &mut DataContext,
) -> Result<FixedHashSet<i32, A>, AllocationFailed>
where
    A: Allocator,
{
    let mut values = fixed_set_in(alloc);
    values.try_reserve(INNER_LEN)?;

    for _ in 0..INNER_LEN {
        try_insert(&mut values, data.random_int())?;
    }

    Ok(values)
}

fn random_string_set<A>(
    alloc: A,
    data: &mut DataContext,
) -> Result<FixedHashSet<PoolString<A>, A>, AllocationFailed>
where
    A: Allocator + Clone,
{
    let mut values = fixed_set_in(alloc);
    values.try_reserve(INNER_LEN)?;

    for _ in 0..INNER_LEN {
        let text = random_string(values.allocator().clone(), data)?;
        try_insert(&mut values, text)?;
    }

    Ok(values)
}

/// Reserves room for `copies`, then pushes the element built by `first` followed by `copies`
/// deep copies of the last element.
fn push_copies<T, A, F>(
    vec: &mut Vec<T, A>,
    copies: usize,
    data: &mut DataContext,
    first: F,
) -> Result<(), AllocationFailed>
where
    T: TryClone,
    A: Allocator + Clone,
    F: FnOnce(A, &mut DataContext) -> Result<T, AllocationFailed>,
{
    vec.try_reserve(copies)?;
    let first = first(vec.allocator().clone(), data)?;
    try_push(vec, first)?;

    for _ in 0..copies {
        let copy = vec[vec.len() - 1].try_clone()?;
        try_push(vec, copy)?;
    }

    Ok(())
}

/// Reserves room for `copies`, then inserts the element built by `first` followed by `copies`
/// deep copies of an arbitrary member, each under a new key.
fn insert_copies<T, A, F>(
    set: &mut FixedHashSet<Keyed<T>, A>,
    copies: usize,
    data: &mut DataContext,
    first: F,
) -> Result<(), AllocationFailed>
where
    T: TryClone,
    A: Allocator + Clone,
    F: FnOnce(A, &mut DataContext) -> Result<T, AllocationFailed>,
{
    set.try_reserve(copies)?;
    let first = first(set.allocator().clone(), data)?;
    try_insert(set, Keyed::new(data.next_serial(), first))?;

    for _ in 0..copies {
        let copy = set
            .iter()
            .next()
            .expect("the first member is never removed")
            .value()
            .try_clone()?;

        try_insert(set, Keyed::new(data.next_serial(), copy))?;
    }

    Ok(())
}

workload! {
    /// Shape 1: pushes `0..n` into a vector of integers.
    VecInt: Vec<i32, A> = Vec::new_in;
    |container, elements, _data| {
        container.try_reserve(elements)?;

        for value in (0..).take(elements) {
            try_push(container, value)?;

            if let Some(last) = container.last_mut() {
                touch_int(last);
            }
        }

        Ok(())
    }
}

workload! {
    /// Shape 2: pushes `n` random strings into a vector.
    VecString: Vec<PoolString<A>, A> = Vec::new_in;
    |container, elements, data| {
        container.try_reserve(elements)?;

        for _ in 0..elements {
            let text = random_string(container.allocator().clone(), data)?;
            try_push(container, text)?;

            if let Some(last) = container.last_mut() {
                touch_bytes(last.as_mut_bytes());
            }
        }

        Ok(())
    }
}

workload! {
    /// Shape 3: inserts `0..n` into a hash set of integers.
    SetInt: FixedHashSet<i32, A> = fixed_set_in;
    |container, elements, _data| {
        container.try_reserve(elements)?;

        for value in (0..).take(elements) {
            try_insert(container, value)?;
        }

        Ok(())
    }
}

workload! {
    /// Shape 4: inserts `n` random strings into a hash set.
    SetString: FixedHashSet<PoolString<A>, A> = fixed_set_in;
    |container, elements, data| {
        container.try_reserve(elements)?;

        for _ in 0..elements {
            let text = random_string(container.allocator().clone(), data)?;
            try_insert(container, text)?;
        }

        Ok(())
    }
}

workload! {
    /// Shape 5: a vector of 128 ones, followed by `n` copies of it.
    VecVecInt: Vec<Vec<i32, A>, A> = Vec::new_in;
    |container, elements, data| push_copies(container, elements, data, ones)
}

workload! {
    /// Shape 6: a vector of 128 random strings, followed by `n` copies of it.
    VecVecString: Vec<Vec<PoolString<A>, A>, A> = Vec::new_in;
    |container, elements, data| push_copies(container, elements, data, random_strings)
}

workload! {
    /// Shape 7: a set of 128 random integers, followed by `n` copies of it.
    VecSetInt: Vec<FixedHashSet<i32, A>, A> = Vec::new_in;
    |container, elements, data| push_copies(container, elements, data, random_int_set)
}

workload! {
    /// Shape 8: a set of 128 random strings, followed by `n` copies of it.
    VecSetString: Vec<FixedHashSet<PoolString<A>, A>, A> = Vec::new_in;
    |container, elements, data| push_copies(container, elements, data, random_string_set)
}

workload! {
    /// Shape 9: a vector of 128 random integers, followed by `n` copies of it, each a distinct
    /// member of the set.
    SetVecInt: FixedHashSet<Keyed<Vec<i32, A>>, A> = fixed_set_in;
    |container, elements, data| insert_copies(container, elements, data, random_ints)
}

workload! {
    /// Shape 10: a vector of 128 random strings, followed by `n` copies of it.
    SetVecString: FixedHashSet<Keyed<Vec<PoolString<A>, A>>, A> = fixed_set_in;
    |container, elements, data| insert_copies(container, elements, data, random_strings)
}

workload! {
    /// Shape 11: a set of 128 random integers, followed by `n` copies of it.
    SetSetInt: FixedHashSet<Keyed<FixedHashSet<i32, A>>, A> = fixed_set_in;
    |container, elements, data| insert_copies(container, elements, data, random_int_set)
}

workload! {
    /// Shape 12: a set of 128 random strings, followed by `n` copies of it.
    SetSetString: FixedHashSet<Keyed<FixedHashSet<PoolString<A>, A>>, A> = fixed_set_in;
    |container, elements, data| insert_copies(container, elements, data, random_string_set)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use allocator_api2::alloc::Global;
    use arena_pools::{ArenaPool, PoolAdaptor};
    use testing::FailingPool;

    use super::*;

    fn filled<W: Workload>(elements: usize) -> W::Container<Global> {
        let mut data = DataContext::new(0);
        let mut container = W::create(Global);
        W::populate(&mut container, elements, &mut data).unwrap();
        container
    }

    #[test]
    fn flat_integer_shapes_hold_touched_range() {
        let vector = filled::<VecInt>(10);
        assert_eq!(vector.len(), 10);
        assert!(vector.iter().all(|&value| value == -1));

        let set = filled::<SetInt>(10);
        assert_eq!(set.len(), 10);
        assert!(set.contains(&9));
    }

    #[test]
    fn flat_string_shapes_hold_touched_strings() {
        let vector = filled::<VecString>(10);
        assert_eq!(vector.len(), 10);
        for text in &vector {
            assert!((33..=1000).contains(&text.len()));
            assert_eq!(text.as_bytes()[..4], [0xff; 4]);
        }

        let set = filled::<SetString>(10);
        assert!(!set.is_empty());
    }

    #[test]
    fn nested_vectors_hold_first_plus_copies() {
        let ints = filled::<VecVecInt>(4);
        assert_eq!(ints.len(), 5);
        assert!(ints.iter().all(|inner| inner.len() == 128));
        assert!(ints.iter().flatten().all(|&value| value == 1));

        let strings = filled::<VecVecString>(4);
        assert_eq!(strings.len(), 5);
        assert!(strings.iter().all(|inner| inner.len() == 128));
        assert_eq!(strings[0][7], strings[4][7]);
    }

    #[test]
    fn vectors_of_sets_copy_the_first_set() {
        let ints = filled::<VecSetInt>(3);
        assert_eq!(ints.len(), 4);
        assert_eq!(ints[0], ints[3]);

        let strings = filled::<VecSetString>(3);
        assert_eq!(strings.len(), 4);
        assert_eq!(strings[1].len(), strings[0].len());
    }

    #[test]
    fn sets_of_containers_keep_every_copy() {
        assert_eq!(filled::<SetVecInt>(6).len(), 7);
        assert_eq!(filled::<SetVecString>(6).len(), 7);
        assert_eq!(filled::<SetSetInt>(6).len(), 7);
        assert_eq!(filled::<SetSetString>(6).len(), 7);
    }

    #[test]
    fn nested_containers_share_the_outer_pool() {
        let arena = ArenaPool::new();
        let adaptor = PoolAdaptor::new(&arena);
        let mut data = DataContext::new(0);

        let mut container = SetSetString::create(adaptor);
        SetSetString::populate(&mut container, 2, &mut data).unwrap();

        for member in &container {
            assert!(*member.value().allocator() == adaptor);

            for text in member.value() {
                assert!(!text.is_empty());
            }
        }

        assert!(arena.consumed() > 3 * 128 * 33);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let pool = FailingPool::new(3);
        let mut data = DataContext::new(0);

        let mut container = VecVecString::create(PoolAdaptor::new(&pool));
        let result = VecVecString::populate(&mut container, 8, &mut data);

        assert!(result.is_err());
        assert_eq!(pool.remaining(), 0);
    }
}
