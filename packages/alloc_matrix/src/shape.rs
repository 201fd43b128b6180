use derive_more::Display;

/// Workloads of the `vector:int`-style shapes fill this many times more containers per case
/// than the nested shapes do, because one pass over them is too short to time reliably.
const FLAT_RUN_MULTIPLIER: u64 = 128;

/// The container shape a benchmark case fills, identified on the command line by `1..=12`.
///
/// The display form names the container nesting from the outside in, followed by the element
/// type (e.g. `unordered_set:vector:string`).
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Shape {
    /// 1: a vector of integers.
    #[display("vector:int")]
    VectorInt,

    /// 2: a vector of strings.
    #[display("vector:string")]
    VectorString,

    /// 3: a hash set of integers.
    #[display("unordered_set:int")]
    SetInt,

    /// 4: a hash set of strings.
    #[display("unordered_set:string")]
    SetString,

    /// 5: a vector of integer vectors.
    #[display("vector:vector:int")]
    VectorVectorInt,

    /// 6: a vector of string vectors.
    #[display("vector:vector:string")]
    VectorVectorString,

    /// 7: a vector of integer hash sets.
    #[display("vector:unordered_set:int")]
    VectorSetInt,

    /// 8: a vector of string hash sets.
    #[display("vector:unordered_set:string")]
    VectorSetString,

    /// 9: a hash set of integer vectors.
    #[display("unordered_set:vector:int")]
    SetVectorInt,

    /// 10: a hash set of string vectors.
    #[display("unordered_set:vector:string")]
    SetVectorString,

    /// 11: a hash set of integer hash sets.
    #[display("unordered_set:unordered_set:int")]
    SetSetInt,

    /// 12: a hash set of string hash sets.
    #[display("unordered_set:unordered_set:string")]
    SetSetString,
}

impl Shape {
    /// Every shape, in command-line numbering order.
    pub const ALL: [Self; 12] = [
        Self::VectorInt,
        Self::VectorString,
        Self::SetInt,
        Self::SetString,
        Self::VectorVectorInt,
        Self::VectorVectorString,
        Self::VectorSetInt,
        Self::VectorSetString,
        Self::SetVectorInt,
        Self::SetVectorString,
        Self::SetSetInt,
        Self::SetSetString,
    ];

    /// Looks up a shape by its command-line number.
    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        Self::ALL.get(index).copied()
    }

    /// The command-line number of this shape.
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8 + 1
    }

    /// Whether the elements of this shape are themselves containers.
    #[must_use]
    pub fn is_nested(self) -> bool {
        !matches!(
            self,
            Self::VectorInt | Self::VectorString | Self::SetInt | Self::SetString
        )
    }

    /// How many containers a case fills when the scale asks for `repeat_count` of them.
    #[must_use]
    pub fn runs(self, repeat_count: u64) -> u64 {
        if self.is_nested() {
            repeat_count
        } else {
            repeat_count.saturating_mul(FLAT_RUN_MULTIPLIER)
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_in_order() {
        for (index, shape) in Shape::ALL.into_iter().enumerate() {
            assert_eq!(usize::from(shape.id()), index + 1);
            assert_eq!(Shape::from_id(i64::from(shape.id())), Some(shape));
        }
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        assert_eq!(Shape::from_id(0), None);
        assert_eq!(Shape::from_id(13), None);
        assert_eq!(Shape::from_id(-1), None);
    }

    #[test]
    fn names_follow_nesting() {
        assert_eq!(Shape::VectorInt.to_string(), "vector:int");
        assert_eq!(Shape::SetString.to_string(), "unordered_set:string");
        assert_eq!(
            Shape::SetVectorString.to_string(),
            "unordered_set:vector:string"
        );
        assert_eq!(
            Shape::SetSetInt.to_string(),
            "unordered_set:unordered_set:int"
        );
    }

    #[test]
    fn flat_shapes_run_more_often() {
        assert_eq!(Shape::VectorInt.runs(4), 512);
        assert_eq!(Shape::SetString.runs(4), 512);
        assert_eq!(Shape::VectorVectorInt.runs(4), 4);
        assert_eq!(Shape::SetSetString.runs(1), 1);
    }

    #[test]
    fn first_four_shapes_are_flat() {
        let flat: Vec<u8> = Shape::ALL
            .into_iter()
            .filter(|shape| !shape.is_nested())
            .map(Shape::id)
            .collect();

        assert_eq!(flat, [1, 2, 3, 4]);
    }
}
