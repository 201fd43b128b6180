use derive_more::Display;

/// Which pools a strategy stacks between the containers and the heap.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum PoolChain {
    /// No pool: containers allocate straight from the process heap.
    #[display("new/delete")]
    NewDelete,

    /// A bump arena over the preallocated buffer.
    #[display("monotonic")]
    Monotonic,

    /// A size-class pool drawing from the process heap.
    #[display("multipool")]
    Multipool,

    /// A size-class pool drawing from a bump arena over the preallocated buffer.
    #[display("multipool/monotonic")]
    MultipoolOverMonotonic,
}

/// When the pool type a container allocates from is decided.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Binding {
    /// The container type names the concrete pool type.
    #[display("compile-time")]
    CompileTime,

    /// The container type holds a `dyn Pool`, one container type for every pool.
    #[display("run-time")]
    RunTime,
}

/// An allocation strategy, identified on the command line by `1..=14`.
///
/// Strategies 1 to 7 bind pools at compile time, 8 to 14 repeat the same pool chains bound at
/// run time. The `Drop` variants move the container into its own pool and never destroy it,
/// leaving the memory to be reclaimed in one sweep when the pool goes away.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Strategy {
    /// 1: heap allocation, the baseline for strategies 2 to 7.
    #[display("allocator: new/delete, bound: compile-time")]
    NewDeleteStatic,

    /// 2: bump arena.
    #[display("allocator: monotonic, bound: compile-time")]
    MonotonicStatic,

    /// 3: bump arena, container abandoned inside it.
    #[display("allocator: monotonic/drop, bound: compile-time")]
    MonotonicDropStatic,

    /// 4: size-class pool over the heap.
    #[display("allocator: multipool, bound: compile-time")]
    MultipoolStatic,

    /// 5: size-class pool over the heap, container abandoned inside it.
    #[display("allocator: multipool/drop, bound: compile-time")]
    MultipoolDropStatic,

    /// 6: size-class pool over a bump arena.
    #[display("allocator: multipool/monotonic, bound: compile-time")]
    MultipoolMonotonicStatic,

    /// 7: size-class pool over a bump arena, pool and container abandoned inside the arena.
    #[display("allocator: multipool/monotonic/drop, bound: compile-time")]
    MultipoolMonotonicDropStatic,

    /// 8: heap allocation through a `dyn Pool`, the baseline for strategies 9 to 14.
    #[display("allocator: new/delete, bound: run-time")]
    NewDeleteDynamic,

    /// 9: bump arena.
    #[display("allocator: monotonic, bound: run-time")]
    MonotonicDynamic,

    /// 10: bump arena, container abandoned inside it.
    #[display("allocator: monotonic/drop, bound: run-time")]
    MonotonicDropDynamic,

    /// 11: size-class pool over the heap.
    #[display("allocator: multipool, bound: run-time")]
    MultipoolDynamic,

    /// 12: size-class pool over the heap, container abandoned inside it.
    #[display("allocator: multipool/drop, bound: run-time")]
    MultipoolDropDynamic,

    /// 13: size-class pool over a bump arena.
    #[display("allocator: multipool/monotonic, bound: run-time")]
    MultipoolMonotonicDynamic,

    /// 14: size-class pool over a bump arena, pool and container abandoned inside the arena.
    #[display("allocator: multipool/monotonic/drop, bound: run-time")]
    MultipoolMonotonicDropDynamic,
}

impl Strategy {
    /// Every strategy, in command-line numbering order.
    pub const ALL: [Self; 14] = [
        Self::NewDeleteStatic,
        Self::MonotonicStatic,
        Self::MonotonicDropStatic,
        Self::MultipoolStatic,
        Self::MultipoolDropStatic,
        Self::MultipoolMonotonicStatic,
        Self::MultipoolMonotonicDropStatic,
        Self::NewDeleteDynamic,
        Self::MonotonicDynamic,
        Self::MonotonicDropDynamic,
        Self::MultipoolDynamic,
        Self::MultipoolDropDynamic,
        Self::MultipoolMonotonicDynamic,
        Self::MultipoolMonotonicDropDynamic,
    ];

    /// Looks up a strategy by its command-line number.
    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        Self::ALL.get(index).copied()
    }

    /// The command-line number of this strategy.
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8 + 1
    }

    /// The pools this strategy stacks between containers and the heap.
    #[must_use]
    pub fn pool_chain(self) -> PoolChain {
        match self {
            Self::NewDeleteStatic | Self::NewDeleteDynamic => PoolChain::NewDelete,
            Self::MonotonicStatic
            | Self::MonotonicDropStatic
            | Self::MonotonicDynamic
            | Self::MonotonicDropDynamic => PoolChain::Monotonic,
            Self::MultipoolStatic
            | Self::MultipoolDropStatic
            | Self::MultipoolDynamic
            | Self::MultipoolDropDynamic => PoolChain::Multipool,
            Self::MultipoolMonotonicStatic
            | Self::MultipoolMonotonicDropStatic
            | Self::MultipoolMonotonicDynamic
            | Self::MultipoolMonotonicDropDynamic => PoolChain::MultipoolOverMonotonic,
        }
    }

    /// Whether containers name their pool type statically or through `dyn Pool`.
    #[must_use]
    pub fn binding(self) -> Binding {
        if self.id() <= 7 {
            Binding::CompileTime
        } else {
            Binding::RunTime
        }
    }

    /// Whether the container is abandoned inside its pool instead of being destroyed.
    #[must_use]
    pub fn drops(self) -> bool {
        matches!(
            self,
            Self::MonotonicDropStatic
                | Self::MultipoolDropStatic
                | Self::MultipoolMonotonicDropStatic
                | Self::MonotonicDropDynamic
                | Self::MultipoolDropDynamic
                | Self::MultipoolMonotonicDropDynamic
        )
    }

    /// Whether this strategy is the reference that others with the same binding are
    /// compared against.
    #[must_use]
    pub fn is_baseline(self) -> bool {
        self.pool_chain() == PoolChain::NewDelete
    }

    /// Whether the process heap should be fragmented before this strategy is timed.
    ///
    /// Only heap-backed baselines are affected by heap state in a way worth simulating, so
    /// only they get a churned heap.
    #[must_use]
    pub fn churns_heap(self) -> bool {
        self.is_baseline()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_in_order() {
        for (index, strategy) in Strategy::ALL.into_iter().enumerate() {
            assert_eq!(usize::from(strategy.id()), index + 1);
            assert_eq!(Strategy::from_id(i64::from(strategy.id())), Some(strategy));
        }

        assert_eq!(Strategy::from_id(0), None);
        assert_eq!(Strategy::from_id(15), None);
    }

    #[test]
    fn second_half_mirrors_first_half() {
        for (first, second) in Strategy::ALL[..7].iter().zip(&Strategy::ALL[7..]) {
            assert_eq!(first.pool_chain(), second.pool_chain());
            assert_eq!(first.drops(), second.drops());
            assert_eq!(first.binding(), Binding::CompileTime);
            assert_eq!(second.binding(), Binding::RunTime);
        }
    }

    #[test]
    fn baselines_are_one_and_eight() {
        let baselines: Vec<u8> = Strategy::ALL
            .into_iter()
            .filter(|strategy| strategy.is_baseline())
            .map(Strategy::id)
            .collect();

        assert_eq!(baselines, [1, 8]);
    }

    #[test]
    fn only_baselines_churn() {
        assert!(Strategy::NewDeleteStatic.churns_heap());
        assert!(Strategy::NewDeleteDynamic.churns_heap());
        assert!(!Strategy::MonotonicStatic.churns_heap());
        assert!(!Strategy::MultipoolDropDynamic.churns_heap());
    }

    #[test]
    fn names_combine_chain_and_binding() {
        assert_eq!(
            Strategy::NewDeleteStatic.to_string(),
            "allocator: new/delete, bound: compile-time"
        );
        assert_eq!(
            Strategy::MultipoolMonotonicDropDynamic.to_string(),
            "allocator: multipool/monotonic/drop, bound: run-time"
        );

        for strategy in Strategy::ALL {
            let name = strategy.to_string();
            assert!(name.contains(&strategy.pool_chain().to_string()));
            assert!(name.ends_with(&strategy.binding().to_string()));
            assert_eq!(name.contains("/drop"), strategy.drops());
        }
    }
}
