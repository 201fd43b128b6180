#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Measures how container workloads perform across a matrix of memory allocation strategies.
//!
//! A benchmark case combines three things:
//!
//! * A [`Shape`] - one of twelve container shapes, from a flat vector of integers to a hash
//!   set of hash sets of strings.
//! * A [`Strategy`] - one of fourteen ways of supplying memory. Seven pool chains (the process
//!   heap, a bump arena, size-class pools, and combinations of these, with or without dropping
//!   the containers) each appear twice: once with the pool type named by the container type,
//!   once behind a `dyn Pool`.
//! * A [`Scale`] - how many elements in total, and how many per container.
//!
//! The [`Harness`] runs a [`CasePlan`] and times it. Each case normally runs in a forked child
//! process, so that one case exhausting memory or fragmenting the heap does not affect the
//! next. Heap baselines are measured against a deliberately fragmented heap, see [`churn()`].
//!
//! Results are relative: every non-baseline case is reported as a percentage of the wall
//! clock time of the heap baseline with the same binding.
//!
//! ```
//! use alloc_matrix::{CasePlan, Harness, Isolation, OutputFormat};
//!
//! let mut harness = Harness::builder()
//!     .arena_bytes(1 << 20)
//!     .isolation(Isolation::InProcess)
//!     .no_churn()
//!     .build()
//!     .unwrap();
//!
//! // 2^10 strings in containers of 2^4, all drawn from the bump arena.
//! let plan = CasePlan::from_arguments(10, 4, 2, 2).unwrap();
//! let report = harness.run_and_report(&plan, Some(0.5)).unwrap();
//!
//! let mut line = Vec::new();
//! report.write_to(OutputFormat::Csv, &mut line).unwrap();
//!
//! assert!(String::from_utf8(line).unwrap().ends_with(
//!     "vector:string, allocator: monotonic, bound: compile-time\n"
//! ));
//! ```
//!
//! The `alloc_matrix` binary exposes the same functionality on the command line, taking the
//! numeric identifiers of the shape and strategy as positional arguments.

mod churn;
mod containers;
mod data;
mod error;
mod harness;
mod isolation;
mod matrix;
mod measure;
mod monotonic;
mod pal;
mod plan;
mod report;
mod shape;
mod strategy;
mod workloads;

pub use churn::{ChurnConfig, ChurnReport, churn};
pub use data::DataContext;
pub use error::{AllocationFailed, ArgumentError, HarnessError, IsolationError};
pub use harness::{DEFAULT_ARENA_BYTES, Harness, HarnessBuilder};
pub use isolation::{Isolation, WorkerCommand};
pub use measure::{CaseOutcome, FailureCause, Percentage, Timings};
pub use plan::{
    CasePlan, MAX_SIZE_LOG2, Scale, parse_float_lenient, parse_int_lenient, validate_reference,
};
pub use report::{CaseReport, OutputFormat};
pub use shape::Shape;
pub use strategy::{Binding, PoolChain, Strategy};
