use crate::{ArgumentError, Shape, Strategy};

/// The largest accepted log2 of the total element count.
pub const MAX_SIZE_LOG2: u32 = 30;

/// How many elements a case processes and how they are split across containers.
///
/// A case touches `2^size` elements in total, as `2^(size - split)` containers of
/// `2^split` elements each.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Scale {
    size_log2: u32,
    split_log2: u32,
}

impl Scale {
    /// Validates a size and split given as log2 values.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentError::SizeOutOfRange`] if `size_log2` is outside
    /// `1..=MAX_SIZE_LOG2`, else [`ArgumentError::SplitOutOfRange`] if `split_log2` is outside
    /// `1..=size_log2`.
    pub fn new(size_log2: i64, split_log2: i64) -> Result<Self, ArgumentError> {
        let size = u32::try_from(size_log2)
            .ok()
            .filter(|size| (1..=MAX_SIZE_LOG2).contains(size))
            .ok_or(ArgumentError::SizeOutOfRange { value: size_log2 })?;

        let split = u32::try_from(split_log2)
            .ok()
            .filter(|split| (1..=size).contains(split))
            .ok_or(ArgumentError::SplitOutOfRange {
                value: split_log2,
                size: size_log2,
            })?;

        Ok(Self {
            size_log2: size,
            split_log2: split,
        })
    }

    /// The log2 of the total element count.
    #[must_use]
    pub fn size_log2(&self) -> u32 {
        self.size_log2
    }

    /// The log2 of the element count per container.
    #[must_use]
    pub fn split_log2(&self) -> u32 {
        self.split_log2
    }

    /// How many elements go into each container.
    #[must_use]
    pub fn elements_per_container(&self) -> usize {
        1 << self.split_log2
    }

    /// How many containers the total element count is split into.
    #[must_use]
    pub fn repeat_count(&self) -> u64 {
        1 << (self.size_log2 - self.split_log2)
    }
}

/// One fully validated benchmark case: which shape to fill, how, and at what scale.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CasePlan {
    shape: Shape,
    strategy: Strategy,
    scale: Scale,
}

impl CasePlan {
    /// Combines already validated parts into a plan.
    #[must_use]
    pub fn new(shape: Shape, strategy: Strategy, scale: Scale) -> Self {
        Self {
            shape,
            strategy,
            scale,
        }
    }

    /// Validates raw numeric arguments in command-line order: size, split, data structure,
    /// allocation strategy.
    ///
    /// # Errors
    ///
    /// Returns the error for the first argument that is out of range.
    pub fn from_arguments(
        size_log2: i64,
        split_log2: i64,
        shape: i64,
        strategy: i64,
    ) -> Result<Self, ArgumentError> {
        let scale = Scale::new(size_log2, split_log2)?;
        let shape = Shape::from_id(shape).ok_or(ArgumentError::ShapeOutOfRange { value: shape })?;
        let strategy = Strategy::from_id(strategy)
            .ok_or(ArgumentError::StrategyOutOfRange { value: strategy })?;

        Ok(Self::new(shape, strategy, scale))
    }

    /// The container shape this case fills.
    #[must_use]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// The allocation strategy this case measures.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The element counts of this case.
    #[must_use]
    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// How many containers are created, filled and released while this case is timed.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.shape.runs(self.scale.repeat_count())
    }
}

/// Validates the reference time a non-sweep case is compared against.
///
/// Returns `None` when there is nothing to compare against, which is only acceptable for the
/// baseline strategies.
///
/// # Errors
///
/// Returns [`ArgumentError::InvalidReference`] if the reference is negative or not finite, or
/// if it is zero for a strategy that is not a baseline.
pub fn validate_reference(
    strategy: Strategy,
    reference: f64,
) -> Result<Option<f64>, ArgumentError> {
    let invalid = !reference.is_finite()
        || reference < 0.0
        || (reference <= 0.0 && !strategy.is_baseline());

    if invalid {
        return Err(ArgumentError::InvalidReference { value: reference });
    }

    Ok((reference > 0.0).then_some(reference))
}

/// Parses the leading integer of `text`, ignoring anything after it.
///
/// Leading whitespace and one sign are accepted. Text without leading digits yields zero and
/// values beyond the `i64` range saturate.
///
/// ```
/// use alloc_matrix::parse_int_lenient;
///
/// assert_eq!(parse_int_lenient("12abc"), 12);
/// assert_eq!(parse_int_lenient("  -7"), -7);
/// assert_eq!(parse_int_lenient("abc"), 0);
/// ```
#[must_use]
pub fn parse_int_lenient(text: &str) -> i64 {
    let text = text.trim_start();

    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0_i64, |value, digit| {
            value
                .saturating_mul(10)
                .saturating_add(i64::from(digit - b'0'))
        });

    if negative { -magnitude } else { magnitude }
}

/// Parses the longest prefix of `text` that forms a floating point number.
///
/// Leading whitespace is skipped. Text without such a prefix yields zero.
///
/// ```
/// use alloc_matrix::parse_float_lenient;
///
/// assert_eq!(parse_float_lenient("0.25s"), 0.25);
/// assert_eq!(parse_float_lenient("1e3x"), 1000.0);
/// assert_eq!(parse_float_lenient("none"), 0.0);
/// ```
#[must_use]
pub fn parse_float_lenient(text: &str) -> f64 {
    let text = text.trim_start();

    (1..=text.len())
        .rev()
        .filter(|&end| text.is_char_boundary(end))
        .find_map(|end| text[..end].parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use testing::f64_diff_abs;

    use super::*;

    #[test]
    fn scale_counts() {
        let scale = Scale::new(10, 4).unwrap();

        assert_eq!(scale.elements_per_container(), 16);
        assert_eq!(scale.repeat_count(), 64);
        assert_eq!(scale.size_log2(), 10);
        assert_eq!(scale.split_log2(), 4);
    }

    #[test]
    fn split_equal_to_size_gives_one_container() {
        let scale = Scale::new(30, 30).unwrap();

        assert_eq!(scale.repeat_count(), 1);
        assert_eq!(scale.elements_per_container(), 1 << 30);
    }

    #[test]
    fn size_bounds() {
        assert!(matches!(
            Scale::new(0, 1),
            Err(ArgumentError::SizeOutOfRange { value: 0 })
        ));
        assert!(matches!(
            Scale::new(31, 1),
            Err(ArgumentError::SizeOutOfRange { value: 31 })
        ));
        assert!(Scale::new(1, 1).is_ok());
    }

    #[test]
    fn split_bounds() {
        assert!(matches!(
            Scale::new(10, 0),
            Err(ArgumentError::SplitOutOfRange { value: 0, size: 10 })
        ));
        assert!(matches!(
            Scale::new(10, 11),
            Err(ArgumentError::SplitOutOfRange {
                value: 11,
                size: 10,
            })
        ));
    }

    #[test]
    fn first_invalid_argument_wins() {
        let error = CasePlan::from_arguments(31, 0, 0, 0).unwrap_err();
        assert_eq!(error.exit_code(), 2);

        let error = CasePlan::from_arguments(10, 11, 0, 0).unwrap_err();
        assert_eq!(error.exit_code(), 3);

        let error = CasePlan::from_arguments(10, 5, 13, 0).unwrap_err();
        assert_eq!(error.exit_code(), 4);

        let error = CasePlan::from_arguments(10, 5, 12, 15).unwrap_err();
        assert_eq!(error.exit_code(), 5);
    }

    #[test]
    fn valid_plan_exposes_parts() {
        let plan = CasePlan::from_arguments(6, 3, 9, 14).unwrap();

        assert_eq!(plan.shape(), Shape::SetVectorInt);
        assert_eq!(plan.strategy(), Strategy::MultipoolMonotonicDropDynamic);
        assert_eq!(plan.scale().elements_per_container(), 8);
        assert_eq!(plan.runs(), 8);
    }

    #[test]
    fn flat_plan_runs_more_containers() {
        let plan = CasePlan::from_arguments(6, 3, 1, 1).unwrap();

        assert_eq!(plan.runs(), 8 * 128);
    }

    #[test]
    fn reference_rules() {
        assert_eq!(
            validate_reference(Strategy::NewDeleteStatic, 0.0).unwrap(),
            None
        );
        assert_eq!(
            validate_reference(Strategy::NewDeleteDynamic, 0.0).unwrap(),
            None
        );
        assert_eq!(
            validate_reference(Strategy::MonotonicStatic, 0.5).unwrap(),
            Some(0.5)
        );

        for value in [-1.0, f64::NAN, f64::INFINITY] {
            let error = validate_reference(Strategy::NewDeleteStatic, value).unwrap_err();
            assert_eq!(error.exit_code(), 6);
        }

        let error = validate_reference(Strategy::MultipoolStatic, 0.0).unwrap_err();
        assert_eq!(error.exit_code(), 6);
    }

    #[test]
    fn lenient_integers() {
        assert_eq!(parse_int_lenient("42"), 42);
        assert_eq!(parse_int_lenient("+3"), 3);
        assert_eq!(parse_int_lenient("7.9"), 7);
        assert_eq!(parse_int_lenient(""), 0);
        assert_eq!(parse_int_lenient("-"), 0);
        assert_eq!(parse_int_lenient("99999999999999999999999"), i64::MAX);
    }

    #[test]
    fn lenient_floats() {
        assert!(f64_diff_abs(parse_float_lenient("1.5"), 1.5, 0.0) < f64::EPSILON);
        assert!(f64_diff_abs(parse_float_lenient(" 2.25abc"), 2.25, 0.0) < f64::EPSILON);
        assert!(f64_diff_abs(parse_float_lenient("-0.5"), -0.5, 0.0) < f64::EPSILON);
        assert!(f64_diff_abs(parse_float_lenient("x1"), 0.0, 0.0) < f64::EPSILON);
        assert!(parse_float_lenient("inf").is_infinite());
    }
}
