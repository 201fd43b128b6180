//! Maps every (shape, strategy) pair to a concrete container type, pool chain and binding.
//!
//! The shape picks the [`Workload`], the strategy binding picks how the container names its
//! allocator, and the strategy pool chain picks which pools are built for each run. All three
//! choices are resolved by `match`, so every pair is a distinct monomorphized loop with no
//! dispatch inside it.

use allocator_api2::alloc::{Allocator, Global};
use arena_pools::{DefaultPool, Pool, PoolAdaptor, SegregatedPool, leak_in};

use crate::monotonic::MonotonicPool;
use crate::workloads::{
    SetInt, SetSetInt, SetSetString, SetString, SetVecInt, SetVecString, VecInt, VecSetInt,
    VecSetString, VecString, VecVecInt, VecVecString, Workload,
};
use crate::{AllocationFailed, Binding, CasePlan, DataContext, PoolChain, Shape, Strategy};

/// How the bump arenas of a case are built over the harness buffer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct ArenaSettings {
    pub(crate) max_align: Option<usize>,
    pub(crate) growth_limit: Option<usize>,
}

/// Hands out a fresh arena over the same buffer for every run.
#[derive(Debug)]
pub(crate) struct ArenaSource<'a> {
    buffer: &'a mut [u8],
    settings: ArenaSettings,
}

impl<'a> ArenaSource<'a> {
    pub(crate) fn new(buffer: &'a mut [u8], settings: ArenaSettings) -> Self {
        Self { buffer, settings }
    }

    /// An arena starting at the beginning of the buffer. Only one can exist at a time.
    fn pool(&mut self) -> MonotonicPool<'_> {
        MonotonicPool::new(
            self.buffer,
            self.settings.max_align,
            self.settings.growth_limit,
        )
    }
}

struct Job<'d> {
    elements: usize,
    data: &'d mut DataContext,
}

fn fill_with<W, A>(alloc: A, job: &mut Job<'_>) -> Result<(), AllocationFailed>
where
    W: Workload,
    A: Allocator + Clone,
{
    let mut container = W::create(alloc);
    W::populate(&mut container, job.elements, job.data)
}

fn fill_leaked_with<W, P, A>(pool: &P, alloc: A, job: &mut Job<'_>) -> Result<(), AllocationFailed>
where
    W: Workload,
    P: Pool + ?Sized,
    A: Allocator + Clone,
{
    let container = leak_in(pool, W::create(alloc))?;
    W::populate(container, job.elements, job.data)
}

/// Chooses the allocator type a container is instantiated with.
trait Bind {
    /// Fills a container that allocates from `pool` and is dropped afterwards.
    fn fill<W: Workload, P: Pool>(pool: &P, job: &mut Job<'_>) -> Result<(), AllocationFailed>;

    /// Fills a container that lives in `pool` itself and is never dropped.
    fn fill_leaked<W: Workload, P: Pool>(
        pool: &P,
        job: &mut Job<'_>,
    ) -> Result<(), AllocationFailed>;

    /// Fills a container that allocates from the process heap.
    fn fill_from_heap<W: Workload>(job: &mut Job<'_>) -> Result<(), AllocationFailed>;
}

/// Containers name the concrete pool type.
struct StaticBinding;

impl Bind for StaticBinding {
    fn fill<W: Workload, P: Pool>(pool: &P, job: &mut Job<'_>) -> Result<(), AllocationFailed> {
        fill_with::<W, _>(PoolAdaptor::new(pool), job)
    }

    fn fill_leaked<W: Workload, P: Pool>(
        pool: &P,
        job: &mut Job<'_>,
    ) -> Result<(), AllocationFailed> {
        fill_leaked_with::<W, _, _>(pool, PoolAdaptor::new(pool), job)
    }

    fn fill_from_heap<W: Workload>(job: &mut Job<'_>) -> Result<(), AllocationFailed> {
        fill_with::<W, _>(Global, job)
    }
}

/// Containers hold a `dyn Pool`, whatever the pool is.
struct DynamicBinding;

impl Bind for DynamicBinding {
    fn fill<W: Workload, P: Pool>(pool: &P, job: &mut Job<'_>) -> Result<(), AllocationFailed> {
        fill_with::<W, _>(PoolAdaptor::new(pool).into_dyn(), job)
    }

    fn fill_leaked<W: Workload, P: Pool>(
        pool: &P,
        job: &mut Job<'_>,
    ) -> Result<(), AllocationFailed> {
        fill_leaked_with::<W, _, _>(pool, PoolAdaptor::new(pool).into_dyn(), job)
    }

    fn fill_from_heap<W: Workload>(job: &mut Job<'_>) -> Result<(), AllocationFailed> {
        Self::fill::<W, _>(&DefaultPool, job)
    }
}

/// Builds the pool chain of `strategy` and fills one container through it.
fn run_once<W, B>(
    strategy: Strategy,
    arenas: &mut ArenaSource<'_>,
    job: &mut Job<'_>,
) -> Result<(), AllocationFailed>
where
    W: Workload,
    B: Bind,
{
    match (strategy.pool_chain(), strategy.drops()) {
        (PoolChain::NewDelete, _) => B::fill_from_heap::<W>(job),
        (PoolChain::Monotonic, false) => B::fill::<W, _>(&arenas.pool(), job),
        (PoolChain::Monotonic, true) => B::fill_leaked::<W, _>(&arenas.pool(), job),
        (PoolChain::Multipool, false) => B::fill::<W, _>(&SegregatedPool::new(&DefaultPool), job),
        (PoolChain::Multipool, true) => {
            B::fill_leaked::<W, _>(&SegregatedPool::new(&DefaultPool), job)
        }
        (PoolChain::MultipoolOverMonotonic, false) => {
            let arena = arenas.pool();
            B::fill::<W, _>(&SegregatedPool::new(&arena), job)
        }
        (PoolChain::MultipoolOverMonotonic, true) => {
            let arena = arenas.pool();
            let pool = leak_in(&arena, SegregatedPool::new(&arena))?;
            B::fill_leaked::<W, _>(&*pool, job)
        }
    }
}

fn run_workload<W>(
    strategy: Strategy,
    runs: u64,
    arenas: &mut ArenaSource<'_>,
    job: &mut Job<'_>,
) -> Result<(), AllocationFailed>
where
    W: Workload,
{
    match strategy.binding() {
        Binding::CompileTime => {
            for _ in 0..runs {
                run_once::<W, StaticBinding>(strategy, arenas, job)?;
            }
        }
        Binding::RunTime => {
            for _ in 0..runs {
                run_once::<W, DynamicBinding>(strategy, arenas, job)?;
            }
        }
    }

    Ok(())
}

/// Runs every container fill of `plan`, stopping at the first allocation failure.
pub(crate) fn run_case(
    plan: &CasePlan,
    arenas: &mut ArenaSource<'_>,
    data: &mut DataContext,
) -> Result<(), AllocationFailed> {
    let strategy = plan.strategy();
    let runs = plan.runs();

    let mut job = Job {
        elements: plan.scale().elements_per_container(),
        data,
    };
    let job = &mut job;

    match plan.shape() {
        Shape::VectorInt => run_workload::<VecInt>(strategy, runs, arenas, job),
        Shape::VectorString => run_workload::<VecString>(strategy, runs, arenas, job),
        Shape::SetInt => run_workload::<SetInt>(strategy, runs, arenas, job),
        Shape::SetString => run_workload::<SetString>(strategy, runs, arenas, job),
        Shape::VectorVectorInt => run_workload::<VecVecInt>(strategy, runs, arenas, job),
        Shape::VectorVectorString => run_workload::<VecVecString>(strategy, runs, arenas, job),
        Shape::VectorSetInt => run_workload::<VecSetInt>(strategy, runs, arenas, job),
        Shape::VectorSetString => run_workload::<VecSetString>(strategy, runs, arenas, job),
        Shape::SetVectorInt => run_workload::<SetVecInt>(strategy, runs, arenas, job),
        Shape::SetVectorString => run_workload::<SetVecString>(strategy, runs, arenas, job),
        Shape::SetSetInt => run_workload::<SetSetInt>(strategy, runs, arenas, job),
        Shape::SetSetString => run_workload::<SetSetString>(strategy, runs, arenas, job),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::Scale;

    fn run(shape: Shape, strategy: Strategy, buffer: &mut [u8], settings: ArenaSettings) -> bool {
        let plan = CasePlan::new(shape, strategy, Scale::new(4, 2).unwrap());
        let mut data = DataContext::new(0);
        let mut arenas = ArenaSource::new(buffer, settings);

        run_case(&plan, &mut arenas, &mut data).is_ok()
    }

    #[test]
    fn every_pair_runs() {
        let mut buffer = vec![1_u8; 1 << 20];

        for shape in Shape::ALL {
            for strategy in Strategy::ALL {
                assert!(
                    run(shape, strategy, &mut buffer, ArenaSettings::default()),
                    "{shape}, {strategy} failed"
                );
            }
        }
    }

    #[test]
    fn every_pair_runs_over_overaligned_arena() {
        let mut buffer = vec![1_u8; 1 << 20];
        let settings = ArenaSettings {
            max_align: Some(64),
            growth_limit: None,
        };

        for shape in Shape::ALL {
            for strategy in Strategy::ALL {
                assert!(
                    run(shape, strategy, &mut buffer, settings),
                    "{shape}, {strategy} failed"
                );
            }
        }
    }

    #[test]
    fn arena_strategies_fail_when_arena_cannot_grow() {
        let mut buffer = vec![1_u8; 256];
        let settings = ArenaSettings {
            max_align: None,
            growth_limit: Some(0),
        };

        for strategy in Strategy::ALL {
            let uses_arena = matches!(
                strategy.pool_chain(),
                PoolChain::Monotonic | PoolChain::MultipoolOverMonotonic
            );

            let succeeded = run(Shape::VectorVectorString, strategy, &mut buffer, settings);

            assert_eq!(succeeded, !uses_arena, "{strategy}");
        }
    }

    #[test]
    fn arena_growth_is_released_between_runs() {
        // Far more total data than the buffer holds, but every run starts from an empty arena.
        let mut buffer = vec![1_u8; 64 * 1024];
        let plan = CasePlan::new(
            Shape::VectorString,
            Strategy::MonotonicStatic,
            Scale::new(10, 6).unwrap(),
        );
        let mut data = DataContext::new(0);
        let mut arenas = ArenaSource::new(&mut buffer, ArenaSettings::default());

        assert!(run_case(&plan, &mut arenas, &mut data).is_ok());
    }
}
