#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Memory pools that back allocator-aware containers for allocation strategy comparisons.
//!
//! This package provides a small family of pools that all speak the same size-only
//! [`Pool`] interface, plus an adaptor that lets any of them back the containers of the
//! [`allocator_api2`] ecosystem (e.g. `allocator_api2::vec::Vec` or `hashbrown::HashSet`).
//!
//! The pools:
//! - [`ArenaPool`] - growable bump allocator over a caller-supplied buffer. Deallocation
//!   is a no-op, memory comes back only when the whole pool goes away.
//! - [`OveralignedArenaPool`] - an [`ArenaPool`] wrapper that additionally honors
//!   alignments above the natural cap, up to a maximum fixed at construction (usually a
//!   cache line).
//! - [`SegregatedPool`] - power-of-two size classes with intrusive free lists, drawing its
//!   chunks from an upstream pool.
//! - [`DefaultPool`] - forwards straight to the process heap.
//!
//! All pools return *naturally aligned* memory: a request of `size` bytes is aligned to the
//! lowest set bit of `size | max_align`.
//!
//! This package is not meant for use in production, serving only as a benchmarking tool.
//!
//! # Sharing one pool across nested containers
//!
//! A [`PoolAdaptor`] is a copyable reference to a pool. Passing a copy of the outer
//! container's adaptor into every nested container makes all levels draw from the same pool.
//!
//! ```
//! use allocator_api2::vec::Vec;
//! use arena_pools::{ArenaPool, PoolAdaptor};
//!
//! let mut buffer = vec![0_u8; 64 * 1024];
//! let arena = ArenaPool::with_buffer(&mut buffer);
//! let adaptor = PoolAdaptor::new(&arena);
//!
//! let mut outer: Vec<Vec<u32, _>, _> = Vec::new_in(adaptor);
//! let mut inner = Vec::new_in(*outer.allocator());
//! inner.push(42);
//! outer.push(inner);
//!
//! assert_eq!(outer.allocator(), outer[0].allocator());
//! assert!(arena.consumed() > 0);
//! ```
//!
//! # Thread safety
//!
//! None of the pools are thread-safe ([`Sync`]). They are designed for single-threaded
//! measurement loops and use interior mutability without synchronization.

mod adaptor;
mod arena;
mod default_pool;
mod overaligned;
mod pool;
mod segregated;

pub use adaptor::PoolAdaptor;
pub use arena::ArenaPool;
pub use default_pool::DefaultPool;
pub use overaligned::OveralignedArenaPool;
pub use pool::{NATURAL_ALIGN_CAP, Pool, PoolError, leak_in, natural_alignment};
pub use segregated::SegregatedPool;
