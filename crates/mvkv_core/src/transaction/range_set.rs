//! Absent-range set.
//!
//! Ranges a transaction proved empty at its snapshot. Kept sorted by start and
//! pairwise disjoint; overlapping or touching ranges are merged on insert.

use crate::types::{Key, KeyRange};
use std::fmt;

/// Ordered set of disjoint half-open key ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbsentRangeSet {
    ranges: Vec<KeyRange>,
}

impl AbsentRangeSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `range`, merging it with every range it overlaps or touches.
    ///
    /// Empty ranges are ignored.
    pub fn add(&mut self, range: KeyRange) {
        if range.is_empty_range() {
            return;
        }

        // Ranges are disjoint and sorted, so their ends are sorted too.
        let lo = self
            .ranges
            .partition_point(|r| r.end.as_ref().is_some_and(|end| *end < range.start));
        let hi = match &range.end {
            Some(end) => self.ranges.partition_point(|r| r.start <= *end),
            None => self.ranges.len(),
        };

        if lo == hi {
            self.ranges.insert(lo, range);
        } else {
            let start = if self.ranges[lo].start < range.start {
                self.ranges[lo].start.clone()
            } else {
                range.start
            };
            let end = match (&self.ranges[hi - 1].end, range.end) {
                (Some(a), Some(b)) => Some(if *a > b { a.clone() } else { b }),
                _ => None,
            };
            self.ranges.splice(lo..hi, [KeyRange { start, end }]);
        }

        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        self.assert_valid();
    }

    /// Whether `key` lies inside some range of the set.
    #[must_use]
    pub fn contains_key(&self, key: &Key) -> bool {
        // First range that does not end at or before `key`.
        let idx = self
            .ranges
            .partition_point(|r| r.end.as_ref().is_some_and(|end| end <= key));
        self.ranges
            .get(idx)
            .is_some_and(|r| r.start <= *key)
    }

    /// Iterates over the ranges in key order.
    pub fn iter(&self) -> std::slice::Iter<'_, KeyRange> {
        self.ranges.iter()
    }

    /// Returns the number of ranges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns true if the set holds no ranges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Removes every range.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Panics unless the set is sorted, non-empty per range, and disjoint with
    /// gaps between neighbours.
    #[cfg(any(debug_assertions, feature = "check-invariants"))]
    pub fn assert_valid(&self) {
        for range in &self.ranges {
            assert!(!range.is_empty_range(), "empty range {range} in {self}");
        }
        for pair in self.ranges.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            match &a.end {
                Some(end) => assert!(
                    *end < b.start,
                    "ranges {a} and {b} overlap or touch in {self}"
                ),
                None => panic!("unbounded range {a} is not last in {self}"),
            }
        }
    }
}

impl<'a> IntoIterator for &'a AbsentRangeSet {
    type Item = &'a KeyRange;
    type IntoIter = std::slice::Iter<'a, KeyRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for AbsentRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{range}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set_of(ranges: &[(&str, Option<&str>)]) -> AbsentRangeSet {
        let mut set = AbsentRangeSet::new();
        for &(start, end) in ranges {
            set.add(match end {
                Some(end) => KeyRange::new(start, end),
                None => KeyRange::unbounded(start),
            });
        }
        set
    }

    #[test]
    fn disjoint_ranges_stay_sorted() {
        let set = set_of(&[("m", Some("p")), ("a", Some("c")), ("f", Some("h"))]);
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.to_string(),
            "{[\"a\", \"c\"), [\"f\", \"h\"), [\"m\", \"p\")}"
        );
    }

    #[test]
    fn overlapping_ranges_merge() {
        let set = set_of(&[("a", Some("d")), ("c", Some("f"))]);
        assert_eq!(set.iter().cloned().collect::<Vec<_>>(), vec![KeyRange::new("a", "f")]);
    }

    #[test]
    fn adjacent_ranges_merge() {
        let set = set_of(&[("a", Some("c")), ("c", Some("e"))]);
        assert_eq!(set.len(), 1);
        assert!(set.contains_key(&Key::from("c")));
    }

    #[test]
    fn bridging_range_swallows_neighbours() {
        let set = set_of(&[
            ("a", Some("b")),
            ("d", Some("e")),
            ("g", Some("h")),
            ("x", Some("y")),
            ("b", Some("g")),
        ]);
        assert_eq!(
            set.iter().cloned().collect::<Vec<_>>(),
            vec![KeyRange::new("a", "h"), KeyRange::new("x", "y")]
        );
    }

    #[test]
    fn unbounded_range_absorbs_tail() {
        let set = set_of(&[("a", Some("b")), ("m", Some("n")), ("k", None)]);
        assert_eq!(
            set.iter().cloned().collect::<Vec<_>>(),
            vec![KeyRange::new("a", "b"), KeyRange::unbounded("k")]
        );
        assert!(set.contains_key(&Key::from("zzz")));
        assert_eq!(set.to_string(), "{[\"a\", \"b\"), [\"k\", +inf)}");
    }

    #[test]
    fn empty_ranges_are_ignored() {
        let set = set_of(&[("d", Some("b")), ("c", Some("c"))]);
        assert!(set.is_empty());
        assert_eq!(set.to_string(), "{}");
    }

    #[test]
    fn membership_at_boundaries() {
        let set = set_of(&[("b", Some("d")), ("f", Some("h"))]);
        assert!(!set.contains_key(&Key::from("a")));
        assert!(set.contains_key(&Key::from("b")));
        assert!(set.contains_key(&Key::from("c")));
        assert!(!set.contains_key(&Key::from("d")));
        assert!(!set.contains_key(&Key::from("e")));
        assert!(set.contains_key(&Key::from("g")));
        assert!(!set.contains_key(&Key::from("h")));
    }

    #[test]
    fn clear_empties_the_set() {
        let mut set = set_of(&[("a", Some("b"))]);
        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains_key(&Key::from("a")));
    }

    fn small_key() -> impl Strategy<Value = Key> {
        prop::collection::vec(0u8..4, 0..3).prop_map(Key::from)
    }

    fn small_range() -> impl Strategy<Value = KeyRange> {
        (small_key(), prop::option::of(small_key())).prop_map(|(start, end)| KeyRange { start, end })
    }

    proptest! {
        #[test]
        fn set_matches_naive_membership(
            ranges in prop::collection::vec(small_range(), 0..12),
            probes in prop::collection::vec(small_key(), 0..24),
        ) {
            let mut set = AbsentRangeSet::new();
            for r in &ranges {
                set.add(r.clone());
            }
            #[cfg(any(debug_assertions, feature = "check-invariants"))]
            set.assert_valid();
            for key in &probes {
                let expected = ranges.iter().any(|r| r.contains_key(key));
                prop_assert_eq!(set.contains_key(key), expected, "key {} in {}", key, set);
            }
        }
    }
}
