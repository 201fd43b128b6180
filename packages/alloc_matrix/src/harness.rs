use std::ffi::OsString;
use std::fmt;
use std::io::{self, Write};

use tracing::debug;

#[cfg(unix)]
use crate::isolation::run_forked;
use crate::isolation::{encode_record, run_spawned};
use crate::matrix::{self, ArenaSettings, ArenaSource};
use crate::pal::PlatformFacade;
use crate::{
    CaseOutcome, CasePlan, CaseReport, ChurnConfig, DataContext, FailureCause, HarnessError,
    Isolation, Percentage, Scale, Shape, Strategy, churn,
};

/// Default size of the preallocated arena buffer: 1 GiB.
pub const DEFAULT_ARENA_BYTES: usize = 1 << 30;

/// Runs benchmark cases and relates their timings to the baselines.
///
/// The harness owns the buffer every arena-backed strategy bumps through. The buffer is
/// written in full when the harness is built, so no case pays for faulting in its pages.
///
/// # Examples
///
/// ```
/// use alloc_matrix::{CasePlan, Harness, Isolation};
///
/// let mut harness = Harness::builder()
///     .arena_bytes(1 << 20)
///     .isolation(Isolation::InProcess)
///     .no_churn()
///     .build()
///     .unwrap();
///
/// let plan = CasePlan::from_arguments(8, 4, 1, 2).unwrap();
/// let report = harness.run_and_report(&plan, None).unwrap();
///
/// assert_eq!(report.plan(), &plan);
/// ```
pub struct Harness {
    buffer: Vec<u8>,
    arena: ArenaSettings,
    isolation: Isolation,
    churn: Option<ChurnConfig>,
    seed: u64,
    platform: PlatformFacade,
}

impl Harness {
    /// Starts configuring a harness.
    #[must_use]
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    /// Runs one case in the current process and times it.
    ///
    /// Heap-backed baselines first get a churned heap, if churn is enabled. The churn is not
    /// part of the measurement.
    pub fn measure_in_process(&mut self, plan: &CasePlan) -> CaseOutcome {
        let mut data = DataContext::new(self.seed);

        if plan.strategy().churns_heap() {
            if let Some(config) = &self.churn {
                churn(config, &mut data);
            }
        }

        let mut arenas = ArenaSource::new(&mut self.buffer, self.arena);

        let stopwatch = crate::measure::Stopwatch::start(&self.platform);
        let result = matrix::run_case(plan, &mut arenas, &mut data);
        let timings = stopwatch.stop();

        match result {
            Ok(()) => {
                debug!(
                    shape = %plan.shape(),
                    strategy = %plan.strategy(),
                    wall = ?timings.wall(),
                    "case completed"
                );
                CaseOutcome::Completed(timings)
            }
            Err(error) => {
                debug!(
                    shape = %plan.shape(),
                    strategy = %plan.strategy(),
                    %error,
                    "case failed"
                );
                CaseOutcome::Failed(FailureCause::OutOfMemory)
            }
        }
    }

    /// Runs one case with the configured isolation.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker process could not be started or its result could not be
    /// read. A case that fails to allocate, or a worker that crashes, is a failed outcome, not
    /// an error.
    pub fn run_case(&mut self, plan: &CasePlan) -> Result<CaseOutcome, HarnessError> {
        match self.isolation {
            Isolation::InProcess => Ok(self.measure_in_process(plan)),
            #[cfg(unix)]
            Isolation::Fork => {
                // The child inherits our stdout buffer, which must not be written out twice.
                io::stdout().flush()?;
                Ok(run_forked(|| self.measure_in_process(plan))?)
            }
            Isolation::Spawn(ref command) => Ok(run_spawned(command, &self.worker_args(plan))?),
        }
    }

    /// Runs one case in the current process and writes its outcome to `out` as a binary
    /// record, the way a spawned worker reports back to the harness that started it.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn run_worker(
        &mut self,
        plan: &CasePlan,
        out: &mut impl Write,
    ) -> Result<(), HarnessError> {
        let outcome = self.measure_in_process(plan);

        out.write_all(&encode_record(&outcome))?;
        out.flush()?;

        Ok(())
    }

    /// Runs one case and relates it to `reference`, the baseline wall time in seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the case could not be run, see [`run_case()`][Self::run_case].
    pub fn run_and_report(
        &mut self,
        plan: &CasePlan,
        reference: Option<f64>,
    ) -> Result<CaseReport, HarnessError> {
        let outcome = self.run_case(plan)?;
        let percentage = Percentage::compute(plan.strategy(), &outcome, reference);

        Ok(CaseReport::new(*plan, outcome, percentage))
    }

    /// Runs all strategies for one shape in order, handing each report to `emit` as soon as
    /// it is ready.
    ///
    /// Each baseline's wall time becomes the reference for the strategies with the same
    /// binding. If a baseline fails, those strategies report no percentage.
    ///
    /// # Errors
    ///
    /// Returns an error if a case could not be run or `emit` fails. Reports emitted before
    /// the error stay emitted.
    pub fn sweep<F>(&mut self, shape: Shape, scale: Scale, mut emit: F) -> Result<(), HarnessError>
    where
        F: FnMut(&CaseReport) -> io::Result<()>,
    {
        let mut reference = None;

        for strategy in Strategy::ALL {
            let plan = CasePlan::new(shape, strategy, scale);
            let outcome = self.run_case(&plan)?;

            if strategy.is_baseline() {
                reference = outcome.wall_seconds();
            }

            let percentage = Percentage::compute(strategy, &outcome, reference);
            emit(&CaseReport::new(plan, outcome, percentage))?;
        }

        Ok(())
    }

    /// Command-line arguments that make a worker process run `plan` the way this harness
    /// would.
    fn worker_args(&self, plan: &CasePlan) -> Vec<OsString> {
        let scale = plan.scale();

        let mut args: Vec<OsString> = [
            scale.size_log2().to_string(),
            scale.split_log2().to_string(),
            plan.shape().id().to_string(),
            plan.strategy().id().to_string(),
            "0".to_owned(),
            "--worker".to_owned(),
            "--seed".to_owned(),
            self.seed.to_string(),
            "--arena-bytes".to_owned(),
            self.buffer.len().to_string(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        if self.churn.is_none() {
            args.push("--no-churn".into());
        }

        if let Some(max_align) = self.arena.max_align {
            args.push("--overaligned".into());
            args.push(max_align.to_string().into());
        }

        if let Some(limit) = self.arena.growth_limit {
            args.push("--arena-growth-bytes".into());
            args.push(limit.to_string().into());
        }

        args
    }
}

impl fmt::Debug for Harness {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("arena_bytes", &self.buffer.len())
            .field("arena", &self.arena)
            .field("isolation", &self.isolation)
            .field("churn", &self.churn)
            .field("seed", &self.seed)
            .field("platform", &self.platform)
            .finish()
    }
}

/// Configures and builds a [`Harness`].
#[derive(Debug)]
#[must_use]
pub struct HarnessBuilder {
    arena_bytes: usize,
    arena: ArenaSettings,
    isolation: Isolation,
    churn: Option<ChurnConfig>,
    seed: u64,
    platform: PlatformFacade,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            arena_bytes: DEFAULT_ARENA_BYTES,
            arena: ArenaSettings::default(),
            isolation: Isolation::InProcess,
            churn: Some(ChurnConfig::default()),
            seed: 0,
            platform: PlatformFacade::real(),
        }
    }

    /// Size of the preallocated arena buffer. Defaults to [`DEFAULT_ARENA_BYTES`].
    pub fn arena_bytes(mut self, bytes: usize) -> Self {
        self.arena_bytes = bytes;
        self
    }

    /// Makes arena-backed strategies honor alignments up to `max_align` instead of the
    /// natural maximum of 16.
    ///
    /// # Panics
    ///
    /// Panics if `max_align` is not a power of two of at least 16.
    pub fn overaligned(mut self, max_align: usize) -> Self {
        assert!(
            max_align.is_power_of_two() && max_align >= arena_pools::NATURAL_ALIGN_CAP,
            "max_align must be a power of two no smaller than {}, got {max_align}",
            arena_pools::NATURAL_ALIGN_CAP
        );

        self.arena.max_align = Some(max_align);
        self
    }

    /// Caps how many bytes an arena may take from the heap once the buffer is used up.
    /// Arena-backed cases that need more fail. Unlimited by default.
    pub fn arena_growth_limit(mut self, bytes: usize) -> Self {
        self.arena.growth_limit = Some(bytes);
        self
    }

    /// Where cases run. Defaults to [`Isolation::InProcess`].
    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Fragments the heap as described by `config` before each baseline case. Enabled with
    /// the default configuration unless disabled.
    pub fn churn(mut self, config: ChurnConfig) -> Self {
        self.churn = Some(config);
        self
    }

    /// Measures baselines on the heap as it is.
    pub fn no_churn(mut self) -> Self {
        self.churn = None;
        self
    }

    /// Seed for the workload data. Defaults to zero.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[cfg(test)]
    pub(crate) fn platform(mut self, platform: PlatformFacade) -> Self {
        self.platform = platform;
        self
    }

    /// Reserves and faults in the arena buffer, then returns the harness.
    ///
    /// # Errors
    ///
    /// Returns an error if the arena buffer cannot be reserved.
    pub fn build(self) -> Result<Harness, HarnessError> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(self.arena_bytes)
            .map_err(|source| HarnessError::ArenaBuffer {
                bytes: self.arena_bytes,
                source,
            })?;

        // Writing every byte makes the OS back the whole buffer before anything is timed.
        buffer.resize(self.arena_bytes, 1);

        debug!(
            arena_bytes = self.arena_bytes,
            max_align = ?self.arena.max_align,
            isolation = ?self.isolation,
            churn = self.churn.is_some(),
            "harness ready"
        );

        Ok(Harness {
            buffer,
            arena: self.arena,
            isolation: self.isolation,
            churn: self.churn,
            seed: self.seed,
            platform: self.platform,
        })
    }
}
