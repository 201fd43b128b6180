use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Size of the scratch text that random strings are sliced from.
pub(crate) const SCRATCH_LEN: usize = 65_536;

/// Upper bound on the length of any random string slice.
pub(crate) const MAX_TEXT_LEN: usize = 1_000;

/// The printable ASCII characters the scratch text is drawn from.
const PRINTABLE: RangeInclusive<char> = '!'..='~';

/// Per-run source of pseudo-random workload data.
///
/// Holds a deterministic random generator and a block of random printable text. Strings are
/// produced by slicing the text at random offsets, which is far cheaper than generating each
/// string character by character and keeps the cost of data generation small next to the
/// allocation cost being measured.
///
/// Every benchmark run owns its own context, seeded by the harness, so workloads are
/// reproducible for a given seed.
#[derive(Debug)]
pub struct DataContext {
    scratch: String,
    rng: StdRng,
    serial: u64,
}

impl DataContext {
    /// Creates a context whose random sequence is fully determined by `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let scratch = (0..SCRATCH_LEN)
            .map(|_| rng.random_range(PRINTABLE))
            .collect();

        Self {
            scratch,
            rng,
            serial: 0,
        }
    }

    /// Returns a random slice of the scratch text whose length is drawn from `lengths`,
    /// clamped to [`MAX_TEXT_LEN`].
    ///
    /// # Panics
    ///
    /// Panics if `lengths` is empty.
    pub(crate) fn random_text(&mut self, lengths: RangeInclusive<usize>) -> &str {
        let len = self.rng.random_range(lengths).min(MAX_TEXT_LEN);
        let start = self.rng.random_range(0..=SCRATCH_LEN - MAX_TEXT_LEN);

        // The scratch text is ASCII, so every offset is a character boundary.
        &self.scratch[start..start + len]
    }

    /// Returns a uniformly distributed random integer.
    pub(crate) fn random_int(&mut self) -> i32 {
        self.rng.random()
    }

    /// Returns a random index in `0..bound`.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is zero.
    pub(crate) fn random_index(&mut self, bound: usize) -> usize {
        self.rng.random_range(0..bound)
    }

    /// Returns a value never returned before by this context.
    ///
    /// Used to give container elements an identity independent of their contents.
    pub(crate) fn next_serial(&mut self) -> u64 {
        self.serial = self.serial.wrapping_add(1);
        self.serial
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn scratch_is_printable_ascii() {
        let context = DataContext::new(1);

        assert_eq!(context.scratch.len(), SCRATCH_LEN);
        assert!(context.scratch.chars().all(|c| PRINTABLE.contains(&c)));
    }

    #[test]
    fn text_lengths_stay_in_range() {
        let mut context = DataContext::new(2);

        for _ in 0..1000 {
            let text = context.random_text(33..=1000);
            assert!((33..=1000).contains(&text.len()));
        }
    }

    #[test]
    fn text_lengths_are_clamped() {
        let mut context = DataContext::new(3);

        let text = context.random_text(5000..=5000);

        assert_eq!(text.len(), MAX_TEXT_LEN);
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = DataContext::new(42);
        let mut b = DataContext::new(42);

        assert_eq!(a.random_int(), b.random_int());
        assert_eq!(a.random_text(25..=128), b.random_text(25..=128));
        assert_eq!(a.random_index(1000), b.random_index(1000));
    }

    #[test]
    fn different_seeds_differ() {
        let a = DataContext::new(1);
        let b = DataContext::new(2);

        assert_ne!(a.scratch, b.scratch);
    }

    #[test]
    fn serials_are_unique() {
        let mut context = DataContext::new(0);

        let first = context.next_serial();
        let second = context.next_serial();

        assert_ne!(first, second);
    }
}
