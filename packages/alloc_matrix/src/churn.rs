use std::collections::LinkedList;
use std::mem;
use std::ops::RangeInclusive;

use tracing::debug;

use crate::DataContext;

/// Shape of the heap fragmentation produced by [`churn()`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChurnConfig {
    /// How many independent string lists share the heap.
    pub subsystems: usize,

    /// How many strings each list starts with.
    pub initial_length: usize,

    /// Total churn iterations, as a multiple of the initial string count.
    pub churn_factor: usize,

    /// Lengths of the strings that are allocated.
    pub string_lengths: RangeInclusive<usize>,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            subsystems: 128,
            initial_length: 65_536,
            churn_factor: 5,
            string_lengths: 25..=128,
        }
    }
}

impl ChurnConfig {
    /// How many iterations a churn with this configuration performs.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.subsystems
            .saturating_mul(self.initial_length)
            .saturating_mul(self.churn_factor)
    }
}

/// What a [`churn()`] call left behind.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChurnReport {
    /// Subsystems whose strings were freed at the end.
    pub destroyed: usize,

    /// Subsystems left allocated for the rest of the process lifetime.
    pub leaked: usize,

    /// Churn iterations performed.
    pub iterations: usize,
}

/// Fragments the process heap so that heap-backed strategies are measured against a heap that
/// looks like it belongs to a long-running service rather than a fresh process.
///
/// Fills a number of subsystems with short strings, then repeatedly moves a string's worth of
/// allocation from a randomly picked subsystem to another one. At the end, the subsystems
/// whose index is not a multiple of four are freed and the rest are leaked, leaving
/// long-lived fragments between freed holes.
///
/// The leaked memory is intentional and never reclaimed. Only call this in a process (or
/// worker) that exists to run benchmarks.
pub fn churn(config: &ChurnConfig, data: &mut DataContext) -> ChurnReport {
    let count = config.subsystems;

    if count == 0 || config.initial_length == 0 {
        debug!("heap churn skipped, nothing to churn");
        return ChurnReport::default();
    }

    let mut subsystems: Vec<LinkedList<String>> = (0..count)
        .map(|_| {
            (0..config.initial_length)
                .map(|_| data.random_text(config.string_lengths.clone()).to_owned())
                .collect()
        })
        .collect();

    let iterations = config.iterations();
    let mut iteration = 0;

    while iteration < iterations {
        let source = data.random_index(count);

        if subsystems[source].pop_front().is_none() {
            continue;
        }

        let text = data.random_text(config.string_lengths.clone()).to_owned();
        subsystems[iteration % count].push_back(text);

        iteration += 1;
    }

    let mut report = ChurnReport {
        iterations,
        ..ChurnReport::default()
    };

    for (index, subsystem) in subsystems.into_iter().enumerate() {
        if index % 4 == 0 {
            mem::forget(subsystem);
            report.leaked += 1;
        } else {
            drop(subsystem);
            report.destroyed += 1;
        }
    }

    debug!(
        iterations = report.iterations,
        destroyed = report.destroyed,
        leaked = report.leaked,
        "heap churn finished"
    );

    report
}
